//! QPG, Query Plan Guidance (§4.3.3).
//!
//! Walks a parsed `EXPLAIN` plan tree looking for expensive or suspicious
//! nodes, independent of whether the query actually ran (`ANALYZE` fields
//! are optional (`actual_time`/`actual_rows` are `None` for a plan-only run).

use super::ScorerOutput;
use serde::{Deserialize, Serialize};

/// A minimal view of one `EXPLAIN` plan node, enough to drive the heuristics
/// below. Real plans nest recursively via `plans`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlanNode {
    /// `node_type`.
    pub node_type: String,
    /// `total_cost`.
    pub total_cost: f64,
    /// `plan_rows`.
    pub plan_rows: u64,
    /// `actual_rows`.
    pub actual_rows: Option<u64>,
    /// `actual_time_ms`.
    pub actual_time_ms: Option<f64>,
    /// `has_filter`.
    pub has_filter: bool,
    /// `has_join_filter`.
    pub has_join_filter: bool,
    #[serde(default)]
    /// `plans`.
    pub plans: Vec<PlanNode>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
/// `Severity`.
pub enum Severity {
    /// `Low`.
    Low,
    /// `High`.
    High,
}

#[derive(Debug, Clone, Serialize)]
/// `PlanFinding`.
pub struct PlanFinding {
    /// `kind`.
    pub kind: &'static str,
    /// `node_type`.
    pub node_type: String,
    /// `severity`.
    pub severity: Severity,
    /// `detail`.
    pub detail: String,
}

const JOIN_NODE_TYPES: [&str; 3] = ["Nested Loop", "Hash Join", "Merge Join"];

/// Recursively flag expensive/slow/suspicious nodes across the whole plan tree.
#[must_use]
pub fn identify_bottlenecks(root: &PlanNode) -> Vec<PlanFinding> {
    let mut findings = Vec::new();
    walk(root, &mut findings);
    findings
}

fn walk(node: &PlanNode, findings: &mut Vec<PlanFinding>) {
    let cost_per_row = if node.plan_rows > 0 { node.total_cost / node.plan_rows as f64 } else { node.total_cost };
    if cost_per_row > 100.0 {
        findings.push(PlanFinding {
            kind: "expensive_node",
            node_type: node.node_type.clone(),
            severity: if cost_per_row > 1000.0 { Severity::High } else { Severity::Low },
            detail: format!("cost_per_row={cost_per_row:.1}"),
        });
    }

    if let Some(actual_ms) = node.actual_time_ms {
        if actual_ms > 100.0 {
            findings.push(PlanFinding {
                kind: "slow_operation",
                node_type: node.node_type.clone(),
                severity: if actual_ms > 1000.0 { Severity::High } else { Severity::Low },
                detail: format!("actual_time_ms={actual_ms:.1}"),
            });
        }
    }

    if JOIN_NODE_TYPES.contains(&node.node_type.as_str()) && node.total_cost > 1000.0 {
        findings.push(PlanFinding {
            kind: "expensive_join",
            node_type: node.node_type.clone(),
            severity: Severity::Low,
            detail: format!("total_cost={:.1}", node.total_cost),
        });
    }

    if node.node_type == "Seq Scan" && node.has_filter {
        findings.push(PlanFinding {
            kind: "sequential_scan_with_filter",
            node_type: node.node_type.clone(),
            severity: Severity::Low,
            detail: "sequential scan with a residual filter".to_string(),
        });
    }

    for child in &node.plans {
        walk(child, findings);
    }
}

/// Diversity across alternative plans for the same query: `(max-min)/max`.
/// Zero when every alternative costs the same (or there's only one plan).
#[must_use]
pub fn analyze_plan_diversity(costs: &[f64]) -> f64 {
    let Some(&max_cost) = costs.iter().max_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal)) else {
        return 0.0;
    };
    if max_cost <= 0.0 {
        return 0.0;
    }
    let min_cost = costs.iter().cloned().fold(f64::INFINITY, f64::min);
    (max_cost - min_cost) / max_cost
}

/// Statistics mismatch and suspected cartesian products, recursed over the tree.
#[must_use]
pub fn identify_logic_bugs(root: &PlanNode) -> Vec<PlanFinding> {
    let mut findings = Vec::new();
    walk_logic_bugs(root, &mut findings);
    findings
}

fn walk_logic_bugs(node: &PlanNode, findings: &mut Vec<PlanFinding>) {
    let planned = node.plan_rows;
    if let Some(actual) = node.actual_rows {
        let max = planned.max(actual).max(1) as f64;
        let discrepancy = (planned as f64 - actual as f64).abs() / max;
        if discrepancy > 0.5 {
            findings.push(PlanFinding {
                kind: "statistics_mismatch",
                node_type: node.node_type.clone(),
                severity: if discrepancy > 2.0 { Severity::High } else { Severity::Low },
                detail: format!("planned={planned} actual={actual} discrepancy_ratio={discrepancy:.2}"),
            });
        }
    }

    if node.node_type == "Nested Loop" && !node.has_join_filter && node.plan_rows > 10_000 {
        findings.push(PlanFinding {
            kind: "potential_cartesian_product",
            node_type: node.node_type.clone(),
            severity: Severity::High,
            detail: format!("plan_rows={}", node.plan_rows),
        });
    }

    for child in &node.plans {
        walk_logic_bugs(child, findings);
    }
}

/// Collapse a plan's findings into a single scorer output: any high-severity
/// finding recommends against building without further validation.
#[must_use]
pub fn to_scorer_output(root: &PlanNode) -> ScorerOutput {
    let mut findings = identify_bottlenecks(root);
    findings.extend(identify_logic_bugs(root));

    let high_severity = findings.iter().filter(|f| f.severity == Severity::High).count();
    let recommend = high_severity == 0;
    let utility = 1.0 - (findings.len() as f64 * 0.1).min(1.0);

    ScorerOutput {
        algorithm_name: "qpg",
        recommend,
        utility: utility.clamp(0.0, 1.0),
        confidence: if root.actual_time_ms.is_some() { 0.9 } else { 0.6 },
        reason: format!("{} findings ({} high severity)", findings.len(), high_severity),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(node_type: &str, total_cost: f64, plan_rows: u64) -> PlanNode {
        PlanNode {
            node_type: node_type.to_string(),
            total_cost,
            plan_rows,
            actual_rows: None,
            actual_time_ms: None,
            has_filter: false,
            has_join_filter: false,
            plans: Vec::new(),
        }
    }

    #[test]
    fn flags_statistics_mismatch_when_discrepancy_exceeds_half() {
        let mut node = leaf("Index Scan", 10.0, 100);
        node.actual_rows = Some(10); // discrepancy = 90/100 = 0.9
        let findings = identify_logic_bugs(&node);
        assert!(findings.iter().any(|f| f.kind == "statistics_mismatch"));
    }

    #[test]
    fn flags_expensive_seq_scan_with_filter() {
        let mut node = leaf("Seq Scan", 50_000.0, 100);
        node.has_filter = true;
        let findings = identify_bottlenecks(&node);
        assert!(findings.iter().any(|f| f.kind == "sequential_scan_with_filter"));
        assert!(findings.iter().any(|f| f.kind == "expensive_node" && f.severity == Severity::High));
    }

    #[test]
    fn flags_cartesian_product_candidate() {
        let mut node = leaf("Nested Loop", 500.0, 50_000);
        node.has_join_filter = false;
        let findings = identify_logic_bugs(&node);
        assert!(findings.iter().any(|f| f.kind == "potential_cartesian_product"));
    }

    #[test]
    fn diversity_is_zero_for_single_plan() {
        assert_eq!(analyze_plan_diversity(&[100.0]), 0.0);
    }

    #[test]
    fn diversity_reflects_cost_spread() {
        let diversity = analyze_plan_diversity(&[100.0, 400.0]);
        assert!((diversity - 0.75).abs() < 1e-9);
    }

    #[test]
    fn recursion_reaches_nested_child_nodes() {
        let mut root = leaf("Hash Join", 200.0, 10);
        let mut child = leaf("Seq Scan", 90_000.0, 100);
        child.has_filter = true;
        root.plans.push(child);
        let findings = identify_bottlenecks(&root);
        assert!(findings.iter().any(|f| f.node_type == "Seq Scan"));
    }
}
