//! Consensus engine: merges the results several agents produced for one
//! trigger into a reduced, conflict-free set.

pub mod engine;
pub mod similarity;

pub use engine::{
    ConflictResolution, ConflictType, ConsensusConfig, ConsensusContext, ConsensusEngine,
    ConsensusHealth, ConsensusMetrics, ConsensusReport, ResolutionStrategy, CONSENSUS_AGENT_ID,
    RESOLVED_ID_PREFIX,
};
