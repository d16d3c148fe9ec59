pub type Result<T> = std::result::Result<T, Error>;

/// Fatal pipeline failures. Soft conditions (missing alignment data, absent
/// lanes or grouping tags) never surface here; stages fall back silently.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("malformed grouping dummy `{node}`: {detail}")]
    MalformedDummy { node: String, detail: String },

    #[error("cycle breaking stalled after {iterations} iterations")]
    CycleBreakerStalled { iterations: usize },

    #[error("graph still contains a cycle through `{node}` after cycle breaking")]
    ResidualCycle { node: String },

    #[error("ranking network is disconnected near `{node}`")]
    DisconnectedNetwork { node: String },

    #[error("node `{node}` has no layer assigned")]
    MissingLayer { node: String },

    #[error("layout engine failure: {message}")]
    Engine { message: String },
}
