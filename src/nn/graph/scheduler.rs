/*
 * @Date         : 2026-03-04
 * @Description  : 拓扑排序（三色 DFS，遇环不报错）
 *
 * - 白/灰/黑三色标记：未访问/进行中/已完成
 * - 先从无入边或显式标记为源头的节点出发，再扫一遍仍未访问的节点（处理不连通分量）
 * - 重新进入“进行中”的节点说明有环：跳过这条边并记录，结果中每个节点仍恰好出现一次
 * - 相同的输入顺序总是得到相同的输出顺序
 */

use super::GraphSnapshot;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// 排序结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schedule {
    pub order: Vec<String>,
    pub cycle_detected: bool,
    /// 因成环而被跳过的边 (source, target)
    pub back_edges: Vec<(String, String)>,
}

impl Schedule {
    /// 节点在排序中的位置
    pub fn position(&self, id: &str) -> Option<usize> {
        self.order.iter().position(|n| n == id)
    }
}

pub struct TopologicalScheduler;

impl TopologicalScheduler {
    /// 对节点排序
    ///
    /// # 参数
    /// - `nodes`: (节点 id, 是否显式标记为源头)，顺序决定遍历顺序
    /// - `edges`: (source, target)；任一端不在`nodes`中的边被忽略
    pub fn sort(nodes: &[(&str, bool)], edges: &[(&str, &str)]) -> Schedule {
        let index: HashMap<&str, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, (id, _))| (*id, i))
            .collect();

        // 邻接表（保持边的输入顺序）
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
        let mut in_degree = vec![0usize; nodes.len()];
        for (source, target) in edges {
            if let (Some(&s), Some(&t)) = (index.get(source), index.get(target)) {
                children[s].push(t);
                in_degree[t] += 1;
            }
        }

        let mut colors = vec![Color::White; nodes.len()];
        let mut post_order = Vec::with_capacity(nodes.len());
        let mut schedule = Schedule::default();

        let roots = (0..nodes.len()).filter(|&i| in_degree[i] == 0 || nodes[i].1);
        let sweep = 0..nodes.len();
        for start in roots.chain(sweep) {
            if colors[start] != Color::White {
                continue;
            }
            // 显式栈：(节点, 下一个待访问的子节点下标)
            let mut stack = vec![(start, 0usize)];
            colors[start] = Color::Gray;
            while let Some(frame) = stack.last_mut() {
                let node = frame.0;
                let child = children[node].get(frame.1).copied();
                frame.1 += 1;
                if let Some(child) = child {
                    match colors[child] {
                        Color::White => {
                            colors[child] = Color::Gray;
                            stack.push((child, 0));
                        }
                        Color::Gray => {
                            schedule.cycle_detected = true;
                            schedule
                                .back_edges
                                .push((nodes[node].0.to_string(), nodes[child].0.to_string()));
                        }
                        Color::Black => {}
                    }
                } else {
                    colors[node] = Color::Black;
                    post_order.push(node);
                    stack.pop();
                }
            }
        }

        schedule.order = post_order
            .into_iter()
            .rev()
            .map(|i| nodes[i].0.to_string())
            .collect();
        schedule
    }

    /// 对快照中满足`keep`的节点构成的诱导子图排序
    pub fn sort_snapshot<F>(snapshot: &GraphSnapshot, keep: F) -> Schedule
    where
        F: Fn(&super::Node) -> bool,
    {
        let nodes: Vec<(&str, bool)> = snapshot
            .nodes
            .iter()
            .filter(|n| keep(n))
            .map(|n| (n.id.as_str(), n.is_source))
            .collect();
        let edges: Vec<(&str, &str)> = snapshot
            .connections
            .iter()
            .map(|c| (c.source.as_str(), c.target.as_str()))
            .collect();
        Self::sort(&nodes, &edges)
    }
}
