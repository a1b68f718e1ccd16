use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Benchmark error: {0}")]
    Bench(#[from] hlsbench_engine::BenchError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
