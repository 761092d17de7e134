use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::info;

use zkbo_common::clock::truncate_to_secs;
use zkbo_common::{
    Clock, Fraction, GraphResolutionError, PipelineConfig, Proof, ProofRequest, ProverError,
    PublicStatement,
};
use zkbo_verifier::ExpiryPolicy;

use crate::adapter::AdapterRegistry;
use crate::aggregator::ExposureAggregator;
use crate::backend::ProvingBackend;
use crate::composer::ProofComposer;
use crate::resolver::OwnershipGraphResolver;
use crate::witness::WitnessBuilder;

/// Outcome of one proving request.
#[derive(Clone, Debug, Serialize)]
pub struct ProofReport {
    pub proof: Proof,
    /// Wall-clock time spent; not part of the proof.
    pub proving_time_ms: u64,
    pub residual: Fraction,
    pub residual_percentage: f64,
    /// Edge-scoped problems absorbed into the residual.
    #[serde(skip)]
    pub resolution_errors: Vec<GraphResolutionError>,
}

/// Resolve, aggregate, witness, stamp and compose for one request.
pub struct ProofPipeline {
    config: PipelineConfig,
    resolver: OwnershipGraphResolver,
    aggregator: ExposureAggregator,
    composer: ProofComposer,
    expiry: ExpiryPolicy,
    clock: Arc<dyn Clock>,
}

impl ProofPipeline {
    pub fn new(
        config: PipelineConfig,
        registry: Arc<AdapterRegistry>,
        backend: Arc<dyn ProvingBackend>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            resolver: OwnershipGraphResolver::new(registry, &config),
            aggregator: ExposureAggregator::new(),
            composer: ProofComposer::new(backend, &config),
            expiry: ExpiryPolicy::from_config(&config),
            clock,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn backend(&self) -> &Arc<dyn ProvingBackend> {
        self.composer.backend()
    }

    pub fn expiry(&self) -> &ExpiryPolicy {
        &self.expiry
    }

    pub async fn prove(&self, request: &ProofRequest) -> Result<ProofReport, ProverError> {
        let started = Instant::now();
        request.validate()?;
        info!(
            "proving {} on {} (as_of {}, max_depth {})",
            request.wallet, self.config.network, request.as_of, request.max_depth
        );

        let graph = self
            .resolver
            .resolve(&request.wallet, request.as_of, request.max_depth)
            .await;
        let aggregation = self.aggregator.aggregate(&graph)?;

        let builder = WitnessBuilder::new(
            &request.wallet,
            request.as_of,
            self.config.network,
            &self.config.blinding_salt,
        );
        let witnesses = builder.build_all(&aggregation.steps).await?;

        let generated_at = truncate_to_secs(self.clock.now());
        let statement = PublicStatement {
            wallet: request.wallet.clone(),
            network: self.config.network,
            as_of: truncate_to_secs(request.as_of),
            nesting_depth: aggregation.nesting_depth,
            protocols_traversed: aggregation.protocols_traversed.clone(),
            exposures: aggregation.exposures.clone(),
            leaf_count: u32::try_from(witnesses.len()).unwrap_or(u32::MAX),
            generated_at,
            expires_at: self.expiry.stamp(generated_at),
        };

        let proof = self.composer.compose(witnesses, &statement).await?;
        let proving_time_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        info!(
            "proof for {} ready in {}ms: {} asset(s), depth {}, residual {}, expires {}",
            request.wallet,
            proving_time_ms,
            proof.exposures.len(),
            proof.nesting_depth,
            aggregation.residual,
            proof.expires_at
        );

        Ok(ProofReport {
            proof,
            proving_time_ms,
            residual: aggregation.residual,
            residual_percentage: aggregation.residual.percentage(),
            resolution_errors: graph.errors().to_vec(),
        })
    }
}
