//! Scenario-based tests for arc-onboard

mod helpers;

mod agent_install;
mod onboarding;
