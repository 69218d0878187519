//! Plan catalog boundary.
//!
//! Pricing lives outside the engine; orders only need to resolve a plan id
//! to an amount and currency at creation time.

use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct Plan {
    pub id: String,
    pub name: String,
    pub amount_minor: i64,
    pub currency: String,
}

pub trait PlanCatalog: Send + Sync {
    fn plan(&self, plan_id: &str) -> Option<Plan>;
}

/// Fixed plan set, for wiring and tests.
pub struct StaticPlanCatalog {
    plans: HashMap<String, Plan>,
}

impl StaticPlanCatalog {
    pub fn new(plans: Vec<Plan>) -> Self {
        Self {
            plans: plans.into_iter().map(|p| (p.id.clone(), p)).collect(),
        }
    }
}

impl PlanCatalog for StaticPlanCatalog {
    fn plan(&self, plan_id: &str) -> Option<Plan> {
        self.plans.get(plan_id).cloned()
    }
}
