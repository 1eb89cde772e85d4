//! Fixed per-step phase order.
//!
//! ```text
//! step t:  [LoadBalancing]  Migration  Disease  Synchronization  Output
//! ```
//!
//! Agent phases are barriers: a phase starts only once every worker has
//! finished the previous one. Load balancing runs at step 0 and then every
//! `lb_period` steps when a period is configured.

use serde::Serialize;

/// One phase of a simulation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Phase {
    /// Relocate agents across workers
    LoadBalancing,

    /// Every city pushes migrants to its neighbors
    Migration,

    /// Every disease integrates its city
    Disease,

    /// Refresh ghost views
    Synchronization,

    /// Gather the global population on the root worker
    Output,
}

impl Phase {
    /// Execution order within a step.
    pub const ORDER: [Phase; 5] = [
        Phase::LoadBalancing,
        Phase::Migration,
        Phase::Disease,
        Phase::Synchronization,
        Phase::Output,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Phase::LoadBalancing => "load_balancing",
            Phase::Migration => "migration",
            Phase::Disease => "disease",
            Phase::Synchronization => "synchronization",
            Phase::Output => "output",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Decides which phases run at each step.
#[derive(Debug, Clone, Copy, Default)]
pub struct Schedule {
    /// Steps between two load balancing phases (step 0 only if `None`)
    lb_period: Option<u64>,
}

impl Schedule {
    pub fn new(lb_period: Option<u64>) -> Self {
        Self { lb_period }
    }

    /// Returns true if load balancing runs at `step`.
    pub fn balances_at(&self, step: u64) -> bool {
        match self.lb_period {
            _ if step == 0 => true,
            Some(period) if period > 0 => step % period == 0,
            _ => false,
        }
    }

    /// Phases of `step`, in execution order.
    pub fn phases(&self, step: u64) -> Vec<Phase> {
        Phase::ORDER
            .iter()
            .copied()
            .filter(|phase| *phase != Phase::LoadBalancing || self.balances_at(step))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_step_runs_every_phase() {
        let schedule = Schedule::default();
        assert_eq!(schedule.phases(0), Phase::ORDER.to_vec());
    }

    #[test]
    fn test_later_steps_skip_balancing() {
        let schedule = Schedule::new(None);
        for step in 1..20 {
            assert_eq!(
                schedule.phases(step),
                vec![Phase::Migration, Phase::Disease, Phase::Synchronization, Phase::Output]
            );
        }
    }

    #[test]
    fn test_periodic_balancing() {
        let schedule = Schedule::new(Some(5));
        let balanced: Vec<u64> = (0..16).filter(|s| schedule.balances_at(*s)).collect();
        assert_eq!(balanced, vec![0, 5, 10, 15]);
        assert_eq!(schedule.phases(10)[0], Phase::LoadBalancing);
    }

    #[test]
    fn test_migration_precedes_disease() {
        let position = |phase| Phase::ORDER.iter().position(|p| *p == phase).unwrap();
        assert!(position(Phase::Migration) < position(Phase::Disease));
        assert!(position(Phase::Disease) < position(Phase::Synchronization));
        assert_eq!(position(Phase::Output), Phase::ORDER.len() - 1);
    }
}
