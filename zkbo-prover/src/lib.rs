//! Proof generation: ownership graph resolution, exposure aggregation,
//! witness building and recursive composition over a proving backend.

pub mod adapter;
pub mod aggregator;
pub mod backend;
pub mod composer;
pub mod graph;
pub mod pipeline;
#[cfg(feature = "remote")]
pub mod remote;
pub mod resolver;
pub mod retry;
pub mod wire;
pub mod witness;

pub use adapter::{standard_protocols, AdapterRegistry, ProtocolAdapter};
pub use aggregator::{Aggregation, ExposureAggregator, TraversalStep, MAX_TRAVERSAL_STEPS};
pub use backend::{backend_from_config, LocalProvingBackend, NodeProof, ProvingBackend};
pub use composer::ProofComposer;
pub use graph::{NodeState, OwnershipGraph};
pub use pipeline::{ProofPipeline, ProofReport};
#[cfg(feature = "remote")]
pub use remote::RemoteProvingBackend;
pub use resolver::OwnershipGraphResolver;
pub use witness::{LeafPublicInput, LeafWitness, PrivateWitness, WitnessBuilder};
