use proptest::prelude::*;
use sqlvtab::executor::{ConstraintOp, IndexConstraint, IndexOrderBy, IndexPlanner};
use sqlvtab::TableConfig;

fn op_strategy() -> impl Strategy<Value = ConstraintOp> {
    prop::sample::select(vec![
        ConstraintOp::Eq,
        ConstraintOp::Gt,
        ConstraintOp::Ge,
        ConstraintOp::Lt,
        ConstraintOp::Le,
        ConstraintOp::Ne,
        ConstraintOp::Like,
        ConstraintOp::IsNull,
        ConstraintOp::Ignored,
    ])
}

fn constraint_strategy() -> impl Strategy<Value = IndexConstraint> {
    (-1i32..4, op_strategy(), any::<bool>()).prop_map(|(column, op, usable)| IndexConstraint {
        column,
        op,
        usable,
    })
}

fn planner_strategy() -> impl Strategy<Value = IndexPlanner> {
    prop::sample::select(vec![vec![-1], vec![0], vec![0, 2], vec![2, 1, 0]])
        .prop_map(|key| IndexPlanner::new(key, TableConfig::default()))
}

proptest! {
    #[test]
    fn prop_adding_eq_never_increases_cost(
        planner in planner_strategy(),
        constraints in prop::collection::vec(constraint_strategy(), 0..8),
        column in -1i32..4,
        at in any::<prop::sample::Index>(),
    ) {
        let before = planner.select_plan(&constraints, &[]);

        let mut more = constraints.clone();
        let pos = at.index(more.len() + 1);
        more.insert(pos, IndexConstraint::new(column, ConstraintOp::Eq));
        let after = planner.select_plan(&more, &[]);

        prop_assert!(
            after.estimated_cost <= before.estimated_cost,
            "cost rose from {} to {}",
            before.estimated_cost,
            after.estimated_cost
        );
    }

    #[test]
    fn prop_usage_is_sequential_in_host_order(
        planner in planner_strategy(),
        constraints in prop::collection::vec(constraint_strategy(), 0..8),
    ) {
        let plan = planner.select_plan(&constraints, &[]);
        prop_assert_eq!(plan.constraint_usage.len(), constraints.len());

        let slots: Vec<i32> = plan
            .constraint_usage
            .iter()
            .map(|u| u.argv_index)
            .filter(|&i| i > 0)
            .collect();
        let expected: Vec<i32> = (1..=slots.len() as i32).collect();
        prop_assert_eq!(&slots, &expected);
        prop_assert_eq!(plan.scan.terms.len(), slots.len());

        for (c, usage) in constraints.iter().zip(&plan.constraint_usage) {
            prop_assert_eq!(usage.omit, usage.argv_index > 0);
            if usage.argv_index > 0 {
                prop_assert!(c.usable && c.op.is_indexable());
                prop_assert!(planner.key_columns().contains(&c.column));
            }
        }
        prop_assert!(plan.estimated_cost > 0.0);
        prop_assert!(plan.estimated_cost <= TableConfig::default().full_scan_cost);
    }
}

#[test]
fn test_cost_ordering() {
    let planner = IndexPlanner::new(vec![0], TableConfig::default());
    let full = planner.select_plan(&[], &[]).estimated_cost;
    let range = planner
        .select_plan(&[IndexConstraint::new(0, ConstraintOp::Gt)], &[])
        .estimated_cost;
    let between = planner
        .select_plan(
            &[
                IndexConstraint::new(0, ConstraintOp::Gt),
                IndexConstraint::new(0, ConstraintOp::Lt),
            ],
            &[],
        )
        .estimated_cost;
    let point = planner
        .select_plan(&[IndexConstraint::new(0, ConstraintOp::Eq)], &[])
        .estimated_cost;

    assert!(point < between);
    assert!(between < range);
    assert!(range < full);
}

#[test]
fn test_order_by_direction_must_be_uniform() {
    let planner = IndexPlanner::new(vec![0, 1], TableConfig::default());
    let both_desc = [
        IndexOrderBy { column: 0, desc: true },
        IndexOrderBy { column: 1, desc: true },
    ];
    let plan = planner.select_plan(&[], &both_desc);
    assert!(plan.order_by_consumed);
    assert!(plan.scan.descending);

    let mixed = [
        IndexOrderBy { column: 0, desc: false },
        IndexOrderBy { column: 1, desc: true },
    ];
    let plan = planner.select_plan(&[], &mixed);
    assert!(!plan.order_by_consumed);
    assert!(!plan.scan.descending);

    assert!(!planner.select_plan(&[], &[]).order_by_consumed);
}
