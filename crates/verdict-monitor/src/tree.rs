//! Process tree expansion.

use std::collections::{HashMap, HashSet, VecDeque};

/// `root` followed by all of its descendants, breadth first.
///
/// `table` holds `(pid, parent pid)` pairs. Cycles (possible with pid reuse)
/// are cut by visiting each pid once.
pub fn descendant_tree(root: u32, table: &[(u32, u32)]) -> Vec<u32> {
    let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
    for &(pid, ppid) in table {
        if pid != ppid {
            children.entry(ppid).or_default().push(pid);
        }
    }

    let mut tree = Vec::new();
    let mut visited = HashSet::new();
    let mut queue = VecDeque::from([root]);
    while let Some(pid) = queue.pop_front() {
        if !visited.insert(pid) {
            continue;
        }
        tree.push(pid);
        if let Some(kids) = children.get(&pid) {
            queue.extend(kids.iter().copied());
        }
    }
    tree
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_only() {
        assert_eq!(descendant_tree(10, &[(1, 0), (5, 1)]), vec![10]);
    }

    #[test]
    fn test_grandchildren_included() {
        let table = [(1, 0), (10, 1), (11, 10), (12, 10), (13, 11), (20, 1)];
        assert_eq!(descendant_tree(10, &table), vec![10, 11, 12, 13]);
    }

    #[test]
    fn test_cycle_terminates() {
        let table = [(10, 11), (11, 10)];
        assert_eq!(descendant_tree(10, &table), vec![10, 11]);
    }
}
