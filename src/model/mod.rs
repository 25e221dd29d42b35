use openskill::model::plackett_luce::PlackettLuce;

pub mod config;
pub mod constants;
pub mod error;
pub mod freeze_board;
pub mod matchmaker;
pub mod outcome_processor;
pub mod ranking;
pub mod rating_store;
pub mod recency;
pub mod refinement_queue;
pub mod session;
pub mod structures;

pub fn create_model() -> PlackettLuce {
    outcome_processor::create_model()
}
