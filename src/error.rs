//! Errors reported by the saddle-point solver.
use crate::solver::SolverPhase;
use core::fmt;
use std::error::Error;
use std::path::PathBuf;

/// One of the two diagonal blocks of the saddle-point system.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Block {
    Velocity,
    Pressure,
}

impl Block {
    /// Short name used in diagnostic file names.
    pub fn short_name(&self) -> &'static str {
        match self {
            Block::Velocity => "A",
            Block::Pressure => "S",
        }
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Block::Velocity => write!(f, "velocity block"),
            Block::Pressure => write!(f, "pressure Schur complement"),
        }
    }
}

/// Failure of an inner solve of the block preconditioner.
///
/// Returned as the error of a preconditioner application, which makes the outer iteration
/// fail and triggers escalation.
#[derive(Debug)]
pub struct InnerSolveError {
    pub block: Block,
    pub tolerance: f64,
    pub iterations: usize,
    /// Residual norm after each inner iteration.
    pub residual_history: Vec<f64>,
    pub cause: String,
}

impl fmt::Display for InnerSolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Inner solve of the {} failed after {} iterations (relative tolerance {:e}): {}",
            self.block, self.iterations, self.tolerance, self.cause
        )
    }
}

impl Error for InnerSolveError {}

#[derive(Debug)]
pub enum StokesSolveError {
    /// Both the cheap and the expensive phase failed. Reported by the coordinator.
    Fatal {
        phase: SolverPhase,
        residual: f64,
        iterations: usize,
        history_files: Vec<PathBuf>,
        cause: String,
    },
    /// The solve failed on another worker, which reports the details.
    Quiet,
    DirectSolveFailed(String),
    /// Diagnostics could not be written.
    Diagnostics(std::io::Error),
}

impl fmt::Display for StokesSolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fatal {
                phase,
                residual,
                iterations,
                history_files,
                cause,
            } => {
                write!(
                    f,
                    "The iterative Stokes solver failed in the {} phase after {} iterations \
                     with residual {:e}: {}.",
                    phase, iterations, residual, cause
                )?;
                if !history_files.is_empty() {
                    write!(f, " The convergence history was written to")?;
                    for (i, path) in history_files.iter().enumerate() {
                        let separator = if i == 0 { " " } else { ", " };
                        write!(f, "{}{}", separator, path.display())?;
                    }
                    write!(f, ".")?;
                }
                Ok(())
            }
            Self::Quiet => write!(f, "The Stokes solve failed on another worker"),
            Self::DirectSolveFailed(msg) => write!(f, "Direct Stokes solve failed: {}", msg),
            Self::Diagnostics(err) => write!(f, "Failed to write solver diagnostics: {}", err),
        }
    }
}

impl Error for StokesSolveError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Diagnostics(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StokesSolveError {
    fn from(err: std::io::Error) -> Self {
        Self::Diagnostics(err)
    }
}
