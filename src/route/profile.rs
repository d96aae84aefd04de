//! Routing profiles: named `{min-hops, max-hops, extra-hop budget, extra-cost budget}` tuples.
//! The extra budgets bound pruning *relative to the current best route found*, not an absolute
//! ceiling.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Profile {
    pub name: &'static str,
    pub min_hops: u32,
    pub max_hops: u32,
    pub max_extra_hops: u32,
    pub max_extra_cost: u32,
}

pub const HOME: Profile = Profile { name: "home", min_hops: 1, max_hops: 1, max_extra_hops: 0, max_extra_cost: 0 };
pub const SINGLE_HOP: Profile =
    Profile { name: "single-hop", min_hops: 1, max_hops: 3, max_extra_hops: 1, max_extra_cost: 10_000 };
pub const DOUBLE_HOP: Profile =
    Profile { name: "double-hop", min_hops: 2, max_hops: 4, max_extra_hops: 2, max_extra_cost: 10_000 };
pub const TRIPLE_HOP: Profile =
    Profile { name: "triple-hop", min_hops: 3, max_hops: 5, max_extra_hops: 3, max_extra_cost: 10_000 };

pub fn by_name(name: &str) -> Option<Profile> {
    match name {
        "home" => Some(HOME),
        "single-hop" => Some(SINGLE_HOP),
        "double-hop" => Some(DOUBLE_HOP),
        "triple-hop" => Some(TRIPLE_HOP),
        _ => None,
    }
}
