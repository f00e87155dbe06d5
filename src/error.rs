use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Aggregating an empty window is a programming bug: the pipeline only
    /// ever hands non-empty batches to the aggregators.
    #[error("cannot aggregate an empty window")]
    EmptyWindow,

    #[error("channel closed: {0}")]
    ChannelClosed(String),
}
