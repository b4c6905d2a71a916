// src/revalidation/mod.rs
mod coordinator;

pub use coordinator::{
    CyclePhase, RevalidationCoordinator, RevalidationOutcome, RevalidationReport,
};
