#![forbid(unsafe_code)]

//! Evaluation engine: signs and submits artifacts to the evaluation service,
//! polls for results, and drives the fan-out/fan-in workflow.

pub mod client;
pub mod driver;
pub mod evaluator;
pub mod extract;
pub mod fanout;
pub mod poller;
pub mod signing;
pub mod store;

pub use client::{SignedRequestClient, Submitter};
pub use driver::WorkflowDriver;
pub use evaluator::ArtifactEvaluator;
pub use extract::{ComplianceExtractor, DEFAULT_RESULT_NAMESPACE};
pub use fanout::{FanOutCoordinator, FanOutPolicy};
pub use poller::{DocumentSource, FetchFailure, HttpDocumentSource, PollingFetcher};
pub use signing::{Credentials, RequestSigner};
pub use store::{FsObjectStore, MemoryObjectStore, ObjectStore, S3ObjectStore, StoreError};
