use crate::core::normalize::Degeneracy;
use std::fmt;
use std::time::Duration;

/// Processing stages a source passes through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Decode,
    Filter,
    Normalize,
    Tile,
    Assemble,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Decode => "decode",
            Stage::Filter => "filter",
            Stage::Normalize => "normalize",
            Stage::Tile => "tile",
            Stage::Assemble => "assemble",
        };
        write!(f, "{}", name)
    }
}

/// Progress notification emitted by the pipeline, tagged with the source id
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    StageStarted {
        source_id: String,
        stage: Stage,
    },
    StageProgress {
        source_id: String,
        stage: Stage,
        done: usize,
        total: usize,
    },
    StageCompleted {
        source_id: String,
        stage: Stage,
        elapsed: Duration,
    },
    StageFailed {
        source_id: String,
        stage: Stage,
        error: String,
    },
    DegenerateInput {
        source_id: String,
        stage: Stage,
        kind: Degeneracy,
    },
}

impl PipelineEvent {
    pub fn source_id(&self) -> &str {
        match self {
            PipelineEvent::StageStarted { source_id, .. }
            | PipelineEvent::StageProgress { source_id, .. }
            | PipelineEvent::StageCompleted { source_id, .. }
            | PipelineEvent::StageFailed { source_id, .. }
            | PipelineEvent::DegenerateInput { source_id, .. } => source_id,
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            PipelineEvent::StageStarted { stage, .. }
            | PipelineEvent::StageProgress { stage, .. }
            | PipelineEvent::StageCompleted { stage, .. }
            | PipelineEvent::StageFailed { stage, .. }
            | PipelineEvent::DegenerateInput { stage, .. } => *stage,
        }
    }
}

/// Receives pipeline events. Called from worker threads when sources are
/// processed in parallel.
pub trait PipelineObserver: Send + Sync {
    fn on_event(&self, event: &PipelineEvent);
}

/// Forwards events to the `log` facade
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

impl PipelineObserver for LogObserver {
    fn on_event(&self, event: &PipelineEvent) {
        match event {
            PipelineEvent::StageStarted { source_id, stage } => {
                log::debug!("[{}] {} started", source_id, stage);
            }
            PipelineEvent::StageProgress {
                source_id,
                stage,
                done,
                total,
            } => {
                log::debug!("[{}] {} {}/{}", source_id, stage, done, total);
            }
            PipelineEvent::StageCompleted {
                source_id,
                stage,
                elapsed,
            } => {
                log::info!("[{}] {} completed in {:.2?}", source_id, stage, elapsed);
            }
            PipelineEvent::StageFailed {
                source_id,
                stage,
                error,
            } => {
                log::error!("[{}] {} failed: {}", source_id, stage, error);
            }
            PipelineEvent::DegenerateInput {
                source_id,
                stage,
                kind,
            } => {
                log::warn!("[{}] degenerate input at {}: {:?}", source_id, stage, kind);
            }
        }
    }
}

/// Discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl PipelineObserver for NullObserver {
    fn on_event(&self, _event: &PipelineEvent) {}
}
