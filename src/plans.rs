//! Static plan catalog.
//!
//! Every license references a plan by id. An unknown or missing plan id
//! resolves to the most restrictive tier rather than failing the request.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskQuota {
    Limited(u32),
    Unlimited,
}

impl TaskQuota {
    /// Monthly cap as an option, `None` meaning unlimited.
    pub fn cap(self) -> Option<u32> {
        match self {
            TaskQuota::Limited(n) => Some(n),
            TaskQuota::Unlimited => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Plan {
    pub id: &'static str,
    pub name: &'static str,
    pub monthly_tasks: TaskQuota,
    pub requests_per_minute: u32,
    /// Model-name prefixes this plan may call. Prefix match, not substring.
    pub allowed_models: &'static [&'static str],
    pub streaming: bool,
}

pub const FREE: Plan = Plan {
    id: "free",
    name: "Free",
    monthly_tasks: TaskQuota::Limited(25),
    requests_per_minute: 5,
    allowed_models: &["gpt-4o-mini"],
    streaming: false,
};

pub const STARTER: Plan = Plan {
    id: "starter",
    name: "Starter",
    monthly_tasks: TaskQuota::Limited(500),
    requests_per_minute: 20,
    allowed_models: &[
        "gpt-4o-mini",
        "gpt-4o",
        "o3-mini",
        "claude-3-5-haiku",
        "gemini-2.0-flash",
        "gemini-1.5-flash",
        "llama-3.1-8b",
        "llama-3.3-70b",
    ],
    streaming: true,
};

pub const PRO: Plan = Plan {
    id: "pro",
    name: "Pro",
    monthly_tasks: TaskQuota::Unlimited,
    requests_per_minute: 60,
    allowed_models: &[
        "gpt-", "chatgpt-", "o1", "o3", "o4", "claude-", "gemini-", "llama", "mixtral", "gemma",
        "deepseek",
    ],
    streaming: true,
};

const CATALOG: &[&Plan] = &[&FREE, &STARTER, &PRO];

pub fn find(plan_id: &str) -> Option<&'static Plan> {
    CATALOG.iter().copied().find(|plan| plan.id == plan_id)
}

/// Resolve a plan id, falling back to the free tier for unknown ids.
pub fn plan_or_free(plan_id: &str) -> &'static Plan {
    find(plan_id).unwrap_or(&FREE)
}

/// True iff `model` equals or extends one of the plan's allowed prefixes.
pub fn is_model_allowed(plan: &Plan, model: &str) -> bool {
    plan.allowed_models
        .iter()
        .any(|allowed| model == *allowed || model.starts_with(allowed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_match_accepts_dated_model_variants() {
        assert!(is_model_allowed(&STARTER, "gpt-4o-mini-2024"));
        assert!(is_model_allowed(&STARTER, "gpt-4o-mini"));
    }

    #[test]
    fn prefix_match_is_not_substring_match() {
        // "gpt-4o" is a prefix of nothing in the free set; "gpt-4o-mini"
        // being an extension of it must not count.
        assert!(!is_model_allowed(&FREE, "gpt-4o"));
        assert!(is_model_allowed(&FREE, "gpt-4o-mini"));
    }

    #[test]
    fn free_plan_rejects_other_providers() {
        assert!(!is_model_allowed(&FREE, "claude-opus-4-20250514"));
        assert!(!is_model_allowed(&FREE, "gemini-2.0-flash"));
    }

    #[test]
    fn unknown_plan_falls_back_to_free() {
        let plan = plan_or_free("enterprise-trial");
        assert_eq!(plan.id, "free");
        assert_eq!(plan.requests_per_minute, 5);
    }

    #[test]
    fn pro_plan_is_unlimited() {
        assert_eq!(PRO.monthly_tasks.cap(), None);
        assert_eq!(STARTER.monthly_tasks.cap(), Some(500));
    }
}
