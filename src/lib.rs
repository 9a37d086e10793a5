pub mod app;
pub mod catalog;
pub mod config;
pub mod harvest;
pub mod humanize;
pub mod observability;
pub mod pipeline;
pub mod platform;
pub mod queue;
pub mod scheduler;
pub mod stager;
pub mod storage;
pub mod worker;
