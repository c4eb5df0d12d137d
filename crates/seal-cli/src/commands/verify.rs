//! Verification commands: one transaction, or every local record.

use std::io::Write;

use seal_attest::{ContentHasher, RecordStore, VerificationEngine};
use seal_ledger::LedgerGateway;
use tracing::info;

use crate::error::CliError;
use crate::output::{CheckReport, OutputFormat, VerifyView};

/// Verify command executor.
pub struct VerifyCommand<L, H> {
    engine: VerificationEngine<L, H>,
    ledger_url: String,
}

impl<L: LedgerGateway, H: ContentHasher> VerifyCommand<L, H> {
    /// Create a new verify command recomputing hashes with `hasher`.
    #[must_use]
    pub fn new(
        ledger: L,
        records: RecordStore,
        hasher: H,
        concurrency: usize,
        ledger_url: impl Into<String>,
    ) -> Self {
        Self {
            engine: VerificationEngine::new(ledger, records, hasher).with_concurrency(concurrency),
            ledger_url: ledger_url.into(),
        }
    }

    /// Verify one transaction and write the three hashes.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::Mismatch`] after writing the result if the hashes
    /// disagree, or an error if verification could not run.
    pub async fn verify<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
        tx_id: &str,
    ) -> Result<(), CliError> {
        let result = self.engine.verify(tx_id).await?;
        let matched = result.status.is_match();
        format.write(writer, &VerifyView::new(result, &self.ledger_url))?;
        if matched {
            Ok(())
        } else {
            Err(CliError::Mismatch(1))
        }
    }

    /// Verify every local record and write a report.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::Mismatch`] if any record disagrees, or
    /// [`CliError::Command`] if some records could not be verified.
    pub async fn check<W: Write>(&self, writer: &mut W, format: &OutputFormat) -> Result<(), CliError> {
        let outcomes = self.engine.check_all().await?;
        let report = CheckReport::new(outcomes, self.engine.hash_anchor());
        format.write(writer, &report)?;
        info!(
            matched = report.matched,
            mismatched = report.mismatched,
            failed = report.failed,
            "check finished"
        );

        if report.mismatched > 0 {
            return Err(CliError::Mismatch(report.mismatched));
        }
        if report.failed > 0 {
            return Err(CliError::Command(format!(
                "{} record(s) could not be verified",
                report.failed
            )));
        }
        Ok(())
    }
}
