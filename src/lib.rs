// COSCHED LIBRARY
// PURE SCHEDULING CORE + COLLABORATOR SEAMS. EVERYTHING HERE RUNS OFFLINE
// (NO DOCKER, NO ROOT) WHEN DRIVEN THROUGH THE RUNTIME/SAMPLER TRAITS.

#[macro_use]
pub mod log;

pub mod catalog;
pub mod controller;
pub mod cores;
pub mod engine;
pub mod event;
pub mod job;
pub mod monitor;
pub mod policy;
pub mod registry;
pub mod report;
pub mod runtime;
pub mod scheduler;
pub mod tuning;
