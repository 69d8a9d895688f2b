//! 节点列表展开
//!
//! 把 `t-cn[1014,1016]`、`compute-10-[11,13-14],compute-11-29` 这类压缩写法展开为主机名列表。
//! 区间下界的位数决定补零宽度，`node[08-11]` 展开为 `node08` 到 `node11`。

/// 按顶层逗号（不在方括号内）切分
fn split_groups(node_list: &str) -> Vec<&str> {
    let mut groups = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in node_list.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                groups.push(&node_list[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    groups.push(&node_list[start..]);
    groups.into_iter().map(str::trim).filter(|g| !g.is_empty()).collect()
}

fn expand_sequence(prefix: &str, suffix: &str, sequence: &str, hosts: &mut Vec<String>) {
    let sequence = sequence.trim();
    if sequence.is_empty() {
        return;
    }
    let Some((lower, upper)) = sequence.split_once('-') else {
        hosts.push(format!("{prefix}{sequence}{suffix}"));
        return;
    };
    match (lower.parse::<u64>(), upper.parse::<u64>()) {
        (Ok(from), Ok(to)) if from <= to => {
            let width = lower.len();
            hosts.extend((from..=to).map(|i| format!("{prefix}{i:0>width$}{suffix}")));
        }
        _ => {
            tracing::warn!(prefix, sequence, "无法识别的节点区间，按原样保留");
            hosts.push(format!("{prefix}{sequence}{suffix}"));
        }
    }
}

/// 展开节点列表
///
/// # Examples
///
/// ```
/// use bart_logger::lrms::nodes::expand_node_list;
///
/// assert_eq!(expand_node_list("t-cn[1014,1016]"), vec!["t-cn1014", "t-cn1016"]);
/// assert_eq!(expand_node_list("node[08-10]"), vec!["node08", "node09", "node10"]);
/// ```
pub fn expand_node_list(node_list: &str) -> Vec<String> {
    let mut hosts = Vec::new();
    for group in split_groups(node_list) {
        let Some((prefix, rest)) = group.split_once('[') else {
            hosts.push(group.to_string());
            continue;
        };
        let (ranges, suffix) = rest.split_once(']').unwrap_or((rest, ""));
        for sequence in ranges.split(',') {
            expand_sequence(prefix, suffix, sequence, &mut hosts);
        }
    }
    hosts
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn set(hosts: &[&str]) -> BTreeSet<String> {
        hosts.iter().map(|h| h.to_string()).collect()
    }

    fn expanded(node_list: &str) -> BTreeSet<String> {
        expand_node_list(node_list).into_iter().collect()
    }

    #[test]
    fn test_single_host() {
        assert_eq!(expand_node_list("brother13"), vec!["brother13"]);
        assert_eq!(expand_node_list("compute-3-29"), vec!["compute-3-29"]);
        assert!(expand_node_list("").is_empty());
    }

    #[test]
    fn test_ranges() {
        assert_eq!(
            expanded("brother[13-14,16,19]"),
            set(&["brother13", "brother14", "brother16", "brother19"])
        );
        assert_eq!(
            expanded("compute-10-[11,13-14,16]"),
            set(&["compute-10-11", "compute-10-13", "compute-10-14", "compute-10-16"])
        );
    }

    #[test]
    fn test_zero_padding() {
        assert_eq!(
            expand_node_list("node[08-11]"),
            vec!["node08", "node09", "node10", "node11"]
        );
        assert_eq!(expand_node_list("n[098-100]"), vec!["n098", "n099", "n100"]);
    }

    #[test]
    fn test_multiple_groups_order_independent() {
        let a = expanded("compute-5-[2,5,9-11],compute-6-[28,31-32],compute-7-4");
        let b = expanded("compute-7-4,compute-6-[28,31-32],compute-5-[2,5,9-11]");
        assert_eq!(a, b);
        assert_eq!(
            a,
            set(&[
                "compute-5-2",
                "compute-5-5",
                "compute-5-9",
                "compute-5-10",
                "compute-5-11",
                "compute-6-28",
                "compute-6-31",
                "compute-6-32",
                "compute-7-4",
            ])
        );
    }

    #[test]
    fn test_plain_host_before_group() {
        assert_eq!(
            expanded("compute-11-12,compute-13-[25-26]"),
            set(&["compute-11-12", "compute-13-25", "compute-13-26"])
        );
    }
}
