use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("failed to build the job worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}
