//! Domain models shared across CiteWeave crates

pub mod job;
pub mod network;
pub mod paper;
pub mod relationship;

pub use job::{JobStatus, JobType, SearchJob};
pub use network::{
    CitationNetwork, CitationNetworkPayload, CitationNetworkRequest, NetworkEdge, NetworkNode,
    NetworkNodePayload, NetworkPayload,
};
pub use paper::{normalize_score, parse_paper, Paper, RawPaper};
pub use relationship::{
    ChildPaper, RelationshipsQuery, RelationshipsResponse, SaveRelationshipsRequest,
    SaveRelationshipsResponse,
};
