//! Attest command implementation.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use seal_attest::{
    AttestError, AttestRequest, AttestationService, IdentityManager, RecordStore, Stage,
};
use seal_element::{ElementSession, SecureKeyStore};
use seal_ledger::{transaction_url, LedgerGateway};
use serde_json::Value;
use tracing::info;

use crate::cli::AttestArgs;
use crate::error::CliError;
use crate::output::{AttestView, OutputFormat};

/// Attest command executor.
pub struct AttestCommand<S: SecureKeyStore, L> {
    identities: IdentityManager<S>,
    service: AttestationService<S, L>,
    ledger_url: String,
}

impl<S: SecureKeyStore, L: LedgerGateway> AttestCommand<S, L> {
    /// Create a new attest command.
    #[must_use]
    pub fn new(
        session: Arc<ElementSession<S>>,
        ledger: L,
        records: RecordStore,
        ledger_url: impl Into<String>,
    ) -> Self {
        Self {
            identities: IdentityManager::new(Arc::clone(&session)),
            service: AttestationService::new(session, ledger, records),
            ledger_url: ledger_url.into(),
        }
    }

    /// Execute the attest command.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or attestation fails.
    pub async fn execute<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
        args: &AttestArgs,
    ) -> Result<(), CliError> {
        let payload = tokio::fs::read(&args.file).await.map_err(|e| {
            CliError::InvalidArgument(format!("cannot read '{}': {e}", args.file.display()))
        })?;
        let view = self.attest(&payload, args).await?;
        format.write(writer, &view)
    }

    /// Attest `payload` as described by `args`.
    ///
    /// # Errors
    ///
    /// Returns an error if the content is already anchored and duplicates
    /// are not allowed, or if attestation fails.
    pub async fn attest(&self, payload: &[u8], args: &AttestArgs) -> Result<AttestView, CliError> {
        let request = build_request(payload, args)?;
        let identity = self.identities.load()?;

        if !args.allow_duplicate {
            let content_hash = self.service.hash(payload)?;
            if let Some(existing) = self.service.find_anchored(&content_hash).await?.first() {
                return Err(CliError::Command(format!(
                    "content {content_hash} is already anchored in transaction {}; \
                     pass --allow-duplicate to attest it again",
                    existing.id
                )));
            }
        }

        let record = self.service.attest(&identity, payload, request).await?;
        let record_path = self
            .service
            .records()
            .path_for(&record.tx_id)
            .map_err(|source| AttestError::Store {
                stage: Stage::Persist,
                source,
            })?;
        info!(tx_id = %record.tx_id, path = %record_path.display(), "record written");

        Ok(AttestView {
            url: transaction_url(&self.ledger_url, &record.tx_id),
            record_path: record_path.display().to_string(),
            record,
        })
    }
}

/// Build the attestation request for `payload`.
///
/// # Errors
///
/// Returns an error if no subject can be determined or a metadata entry is
/// not `KEY=VALUE`.
pub fn build_request(payload: &[u8], args: &AttestArgs) -> Result<AttestRequest, CliError> {
    let subject = match &args.subject {
        Some(subject) => subject.clone(),
        None => default_subject(payload, &args.file).ok_or_else(|| {
            CliError::InvalidArgument(format!(
                "cannot derive a subject id from '{}', pass --subject",
                args.file.display()
            ))
        })?,
    };
    if subject.trim().is_empty() {
        return Err(CliError::InvalidArgument("subject id cannot be empty".into()));
    }

    let mut request = AttestRequest::new(subject);
    for entry in &args.meta {
        let (key, value) = parse_meta(entry)?;
        request = request.with_metadata(key, value);
    }
    Ok(request)
}

/// The `id` field of a JSON object payload, else the file stem.
fn default_subject(payload: &[u8], file: &Path) -> Option<String> {
    let from_json = serde_json::from_slice::<Value>(payload)
        .ok()
        .and_then(|value| value.get("id").and_then(Value::as_str).map(str::to_string));
    from_json.or_else(|| {
        file.file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
    })
}

/// Parse a `KEY=VALUE` metadata entry. Values that parse as JSON stay JSON.
fn parse_meta(entry: &str) -> Result<(String, Value), CliError> {
    let Some((key, raw)) = entry.split_once('=') else {
        return Err(CliError::InvalidArgument(format!(
            "invalid metadata format: {entry}, expected KEY=VALUE"
        )));
    };
    if key.is_empty() {
        return Err(CliError::InvalidArgument(format!(
            "metadata key cannot be empty: {entry}"
        )));
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}
