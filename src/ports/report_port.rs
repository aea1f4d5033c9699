//! Report output port.

use std::path::Path;

use crate::domain::backtest::SymbolResult;
use crate::domain::batch::BatchReport;
use crate::domain::error::SimError;

/// Port for persisting backtest results.
pub trait ReportPort {
    /// Write one symbol/strategy run into `output_dir`.
    fn write(&self, result: &SymbolResult, output_dir: &Path) -> Result<(), SimError>;

    /// Default implementation: writes every completed run in turn.
    fn write_batch(&self, batch: &BatchReport, output_dir: &Path) -> Result<(), SimError> {
        for result in batch.completed() {
            self.write(result, output_dir)?;
        }
        Ok(())
    }
}
