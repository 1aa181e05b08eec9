//! Scenario-based tests for hop, running real shell processes

mod helpers;

#[cfg(unix)]
mod success_chain;
#[cfg(unix)]
mod failure_handling;
#[cfg(unix)]
mod fail_fast;
mod graph_errors;
