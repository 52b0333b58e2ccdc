#![forbid(unsafe_code)]

// bbb-stress library - synthetic-load orchestration engine for
// BigBlueButton-style conferencing servers. Embedders supply a UiDriver
// adapter (the puppeteer equivalent); everything else lives here.

pub mod bbb;
pub mod conference;
pub mod config;
pub mod driver;
pub mod identity;
pub mod join;
pub mod orchestrator;
pub mod population;
pub mod report;
pub mod retry;
pub mod scheduler;
pub mod sim;
