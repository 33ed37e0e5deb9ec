//! Integration tests for studysync-api
//!
//! Uses wiremock to simulate the study server and verifies end-to-end
//! behavior of the StudyApiClient: submissions, question downloads and
//! the health probe.

mod common;

mod test_health;
mod test_submit;
