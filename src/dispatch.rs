//! # Conversion Dispatcher Module
//!
//! Trasforma le entry correnti in UNA richiesta batch verso il servizio di
//! compressione e riconcilia la risposta sulle entry di origine.
//!
//! ## Pipeline di un batch:
//! 1. **prepare** (sync): verifica che ci siano file, snapshot dei settings,
//!    `begin_batch()` sullo store, costruzione delle parti con matching key
//! 2. **send** (async): unica chiamata di rete, nessun accesso allo store
//! 3. **settle** (sync): errore di batch → ripristino delle entry;
//!    successo → riconciliazione per-entry tramite lookup table
//!
//! ## Matching key:
//! `{id}_{nome file}`. Il prefisso id garantisce l'unicità anche con nomi
//! identici. Il servizio sanifica i nomi dei file ricevuti; se la chiave
//! originale non è presente si cerca anche la sua forma sanificata.
//!
//! ## Policy di fallimento parziale:
//! | Caso                               | Esito entry                      |
//! |------------------------------------|----------------------------------|
//! | nessun risultato con quella chiave | `Failed("result not found")`     |
//! | `error` non nullo                  | `Failed(error)`                  |
//! | payload + size, base64 valido      | `Succeeded(bytes, len(bytes))`   |
//! | payload + size, base64 corrotto    | `Failed("decode error")`         |
//! | payload e size nulli               | `Failed("optimization failed")`  |
//!
//! Ogni entry è riconciliata indipendentemente dalle altre. Errori di rete,
//! status non-success e body malformati sono errori di batch: nessuna entry
//! riceve un errore proprio, tutte tornano allo stato precedente.

use crate::config::Settings;
use crate::error::OptimizeError;
use crate::ingest::EntryId;
use crate::store::{BatchEntryStore, ConversionOutcome, EntryStatus};
use base64::Engine;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};
use unicode_normalization::UnicodeNormalization;

pub const DECODE_ERROR: &str = "decode error";
pub const OPTIMIZATION_FAILED: &str = "optimization failed";

/// Success body of the batch endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct BatchResponse {
    pub results: Vec<FileResult>,
}

/// One per-file result, tagged with the matching key it was uploaded under
#[derive(Debug, Clone, Deserialize)]
pub struct FileResult {
    pub filename: String,
    pub original_size: Option<u64>,
    pub optimized_data: Option<String>,
    pub optimized_size: Option<u64>,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// One file of the outbound request
#[derive(Debug, Clone)]
pub struct UploadPart {
    pub key: String,
    pub mime: String,
    pub data: Bytes,
}

/// Entries in flight for one batch, by identity
#[derive(Debug, Clone)]
pub struct BatchTicket {
    ids: Vec<EntryId>,
}

impl BatchTicket {
    pub fn ids(&self) -> &[EntryId] {
        &self.ids
    }
}

/// Everything needed to send a batch, detached from the store
#[derive(Debug, Clone)]
pub struct PreparedBatch {
    pub ticket: BatchTicket,
    pub parts: Vec<UploadPart>,
    pub settings: Settings,
}

/// Final state of one reconciled entry
#[derive(Debug, Clone, PartialEq)]
pub enum EntryOutcome {
    Succeeded { optimized_size: u64 },
    Failed(String),
}

/// Per-entry outcomes of a settled batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub outcomes: Vec<(EntryId, EntryOutcome)>,
    /// In-flight entries removed before the response arrived
    pub dropped: Vec<EntryId>,
}

impl BatchReport {
    pub fn succeeded_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, EntryOutcome::Succeeded { .. }))
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.len() - self.succeeded_count()
    }

    pub fn outcome(&self, id: &EntryId) -> Option<&EntryOutcome> {
        self.outcomes.iter().find(|(i, _)| i == id).map(|(_, o)| o)
    }
}

/// Sends batches to the compression service and reconciles the answers
#[derive(Debug, Clone)]
pub struct ConversionDispatcher {
    client: reqwest::Client,
    endpoint: String,
}

impl ConversionDispatcher {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, OptimizeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OptimizeError::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Prepare, send and settle one batch
    pub async fn run_batch(
        &self,
        store: &mut BatchEntryStore,
        settings: Settings,
    ) -> Result<BatchReport, OptimizeError> {
        let prepared = Self::prepare(store, settings)?;
        let response = self.send(&prepared).await;
        Self::settle(store, prepared.ticket, response)
    }

    /// Snapshot settings, mark every entry `Processing` and build the upload.
    ///
    /// Fails with `NoFiles` on an empty store, before touching anything.
    pub fn prepare(store: &mut BatchEntryStore, settings: Settings) -> Result<PreparedBatch, OptimizeError> {
        if store.is_empty() {
            return Err(OptimizeError::NoFiles);
        }

        let ids = store.begin_batch();
        let parts = store
            .entries()
            .iter()
            .map(|entry| UploadPart {
                key: entry.matching_key(),
                mime: entry.source().mime.clone(),
                data: entry.source().data.clone(),
            })
            .collect();

        Ok(PreparedBatch {
            ticket: BatchTicket { ids },
            parts,
            settings,
        })
    }

    /// The single network round trip of a batch
    pub async fn send(&self, batch: &PreparedBatch) -> Result<BatchResponse, OptimizeError> {
        let mut form = Form::new()
            .text("lossy", batch.settings.lossy().to_string())
            .text("colors", batch.settings.color_count().to_string());

        for part in &batch.parts {
            let file_part = Part::bytes(part.data.to_vec())
                .file_name(part.key.clone())
                .mime_str(&part.mime)?;
            form = form.part("file", file_part);
        }

        info!(
            "📤 Sending {} files to {} (lossy: {}, colors: {})",
            batch.parts.len(),
            self.endpoint,
            batch.settings.lossy(),
            batch.settings.color_count()
        );

        let response = self.client.post(&self.endpoint).multipart(form).send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            return Err(Self::rejection(status, &body));
        }

        serde_json::from_slice::<BatchResponse>(&body).map_err(|e| OptimizeError::MalformedResponse(e.to_string()))
    }

    /// Decode the reason of a rejected request, falling back to the status code
    fn rejection(status: reqwest::StatusCode, body: &[u8]) -> OptimizeError {
        let message = match serde_json::from_slice::<ErrorBody>(body) {
            Ok(parsed) => parsed.error,
            Err(_) => format!("request failed with status {}", status.as_u16()),
        };
        OptimizeError::Server {
            status: status.as_u16(),
            message,
        }
    }

    /// Apply the response of a batch to the store.
    ///
    /// On a batch-level error every in-flight entry is reverted and the error
    /// is handed back unchanged.
    pub fn settle(
        store: &mut BatchEntryStore,
        ticket: BatchTicket,
        response: Result<BatchResponse, OptimizeError>,
    ) -> Result<BatchReport, OptimizeError> {
        match response {
            Ok(response) => Ok(Self::reconcile(store, &ticket, &response)),
            Err(e) => {
                warn!("Batch failed, reverting {} entries: {}", ticket.ids.len(), e);
                store.revert_processing();
                Err(e)
            }
        }
    }

    /// Match every in-flight entry to its result by matching key
    pub fn reconcile(store: &mut BatchEntryStore, ticket: &BatchTicket, response: &BatchResponse) -> BatchReport {
        let mut table: HashMap<&str, &FileResult> = HashMap::with_capacity(response.results.len());
        for result in &response.results {
            table.entry(result.filename.as_str()).or_insert(result);
        }

        let mut report = BatchReport::default();

        for id in &ticket.ids {
            let key = match store.get(id) {
                Some(entry) if entry.is_processing() => entry.matching_key(),
                _ => {
                    debug!("Entry {} left the batch before the response, dropping its result", id);
                    report.dropped.push(id.clone());
                    continue;
                }
            };

            let result = table
                .get(key.as_str())
                .or_else(|| table.get(sanitized_key(&key).as_str()))
                .copied();

            let outcome = match result {
                Some(result) => Self::outcome_for(result),
                None => {
                    debug!("No result for {}", key);
                    ConversionOutcome::Missing
                }
            };
            store.apply_result(id, outcome);

            let final_outcome = match store.get(id).map(|e| e.status()) {
                Some(EntryStatus::Succeeded(result)) => EntryOutcome::Succeeded {
                    optimized_size: result.size,
                },
                Some(EntryStatus::Failed(reason)) => EntryOutcome::Failed(reason.clone()),
                _ => continue,
            };
            report.outcomes.push((id.clone(), final_outcome));
        }

        info!(
            "Batch settled: {} succeeded, {} failed",
            report.succeeded_count(),
            report.failed_count()
        );
        report
    }

    fn outcome_for(result: &FileResult) -> ConversionOutcome {
        if let Some(error) = &result.error {
            return ConversionOutcome::Failed(error.clone());
        }

        match (&result.optimized_data, result.optimized_size) {
            (Some(encoded), Some(reported_size)) => {
                match base64::engine::general_purpose::STANDARD.decode(encoded) {
                    Ok(decoded) => {
                        let size = decoded.len() as u64;
                        if size != reported_size {
                            debug!(
                                "{}: reported size {} differs from decoded size {}",
                                result.filename, reported_size, size
                            );
                        }
                        ConversionOutcome::Succeeded {
                            data: Bytes::from(decoded),
                            size,
                        }
                    }
                    Err(e) => {
                        warn!("{}: invalid base64 payload: {}", result.filename, e);
                        ConversionOutcome::Failed(DECODE_ERROR.to_string())
                    }
                }
            }
            _ => ConversionOutcome::Failed(OPTIMIZATION_FAILED.to_string()),
        }
    }
}

/// The form a filename takes after the service's sanitisation: NFKD
/// decomposition with non-ASCII dropped (`é` becomes `e`), `/` turned into a
/// space, whitespace runs joined by `_`, anything outside `[A-Za-z0-9_.-]`
/// removed and leading or trailing `.`/`_` trimmed.
pub fn sanitized_key(key: &str) -> String {
    let ascii: String = key.nfkd().filter(char::is_ascii).collect();
    let spaced = ascii.replace('/', " ");
    let joined = spaced
        .split(is_separator)
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join("_");
    joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect::<String>()
        .trim_matches(|c| c == '.' || c == '_')
        .to_string()
}

/// ASCII whitespace as the service splits it, vertical tab and `\x1c`-`\x1f` included
fn is_separator(c: char) -> bool {
    c.is_ascii_whitespace() || matches!(c, '\x0b' | '\x1c'..='\x1f')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{IngestionFilter, SourceFile};
    use crate::store::RESULT_NOT_FOUND;
    use mockito::{Matcher, Server};
    use serde_json::json;
    use std::collections::HashSet;

    fn b64(data: &[u8]) -> String {
        base64::engine::general_purpose::STANDARD.encode(data)
    }

    fn store_with(files: Vec<(&str, Vec<u8>)>) -> (BatchEntryStore, Vec<EntryId>) {
        let candidates = files
            .into_iter()
            .map(|(name, data)| SourceFile::new(name, "image/gif", Bytes::from(data)))
            .collect();
        let report = IngestionFilter::new("image/gif").accept(candidates, &HashSet::new());
        let mut store = BatchEntryStore::new();
        let ids = store.add_all(report.accepted);
        (store, ids)
    }

    fn key_of(store: &BatchEntryStore, id: &EntryId) -> String {
        store.get(id).unwrap().matching_key()
    }

    fn ok_result(key: &str, data: &[u8]) -> FileResult {
        FileResult {
            filename: key.to_string(),
            original_size: None,
            optimized_data: Some(b64(data)),
            optimized_size: Some(data.len() as u64),
            error: None,
        }
    }

    fn dispatcher_for(server: &Server) -> ConversionDispatcher {
        ConversionDispatcher::new(format!("{}/api/optimize-gif", server.url()), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_prepare_on_empty_store_fails_without_side_effects() {
        let mut store = BatchEntryStore::new();
        let err = ConversionDispatcher::prepare(&mut store, Settings::default()).unwrap_err();
        assert!(matches!(err, OptimizeError::NoFiles));
    }

    #[test]
    fn test_prepare_labels_every_part_with_matching_key() {
        let (mut store, ids) = store_with(vec![("a.gif", vec![1; 10]), ("a.gif", vec![2; 20])]);
        let prepared = ConversionDispatcher::prepare(&mut store, Settings::new(120, 32)).unwrap();

        assert_eq!(prepared.ticket.ids(), ids.as_slice());
        assert_eq!(prepared.parts.len(), 2);
        assert_eq!(prepared.parts[0].key, format!("{}_a.gif", ids[0]));
        assert_eq!(prepared.parts[1].key, format!("{}_a.gif", ids[1]));
        assert_eq!(prepared.parts[1].data.len(), 20);
        assert_eq!(prepared.settings.lossy(), 120);
        assert!(store.entries().iter().all(|e| e.is_processing()));
    }

    #[test]
    fn test_missing_result_only_affects_its_entry() {
        let (mut store, ids) = store_with(vec![
            ("one.gif", vec![1; 100]),
            ("two.gif", vec![2; 100]),
            ("three.gif", vec![3; 100]),
        ]);
        let prepared = ConversionDispatcher::prepare(&mut store, Settings::default()).unwrap();

        // Results arrive out of order and entry 2 has none
        let response = BatchResponse {
            results: vec![
                FileResult {
                    filename: key_of(&store, &ids[2]),
                    original_size: Some(100),
                    optimized_data: None,
                    optimized_size: None,
                    error: Some("Gifsicle execution error (Code 1): broken".into()),
                },
                ok_result(&key_of(&store, &ids[0]), &[9; 40]),
            ],
        };

        let report = ConversionDispatcher::reconcile(&mut store, &prepared.ticket, &response);

        assert_eq!(store.get(&ids[0]).unwrap().optimized_size(), 40);
        assert_eq!(store.get(&ids[1]).unwrap().error(), Some(RESULT_NOT_FOUND));
        assert_eq!(
            store.get(&ids[2]).unwrap().error(),
            Some("Gifsicle execution error (Code 1): broken")
        );
        assert_eq!(report.succeeded_count(), 1);
        assert_eq!(report.failed_count(), 2);
        assert_eq!(
            report.outcome(&ids[0]),
            Some(&EntryOutcome::Succeeded { optimized_size: 40 })
        );
    }

    #[test]
    fn test_decoded_payload_round_trips_exactly() {
        let payload: Vec<u8> = (0..=255u8).collect();
        let (mut store, ids) = store_with(vec![("a.gif", vec![0; 1000])]);
        let prepared = ConversionDispatcher::prepare(&mut store, Settings::default()).unwrap();
        let response = BatchResponse {
            results: vec![ok_result(&key_of(&store, &ids[0]), &payload)],
        };

        ConversionDispatcher::reconcile(&mut store, &prepared.ticket, &response);

        assert_eq!(store.get(&ids[0]).unwrap().optimized_size(), payload.len() as u64);
        assert_eq!(store.download(&ids[0]).unwrap().data.as_ref(), payload.as_slice());
    }

    #[test]
    fn test_invalid_base64_is_a_per_entry_error() {
        let (mut store, ids) = store_with(vec![("a.gif", vec![0; 10]), ("b.gif", vec![0; 20])]);
        let prepared = ConversionDispatcher::prepare(&mut store, Settings::default()).unwrap();
        let mut broken = ok_result(&key_of(&store, &ids[0]), b"x");
        broken.optimized_data = Some("%%% not base64 %%%".into());
        let response = BatchResponse {
            results: vec![broken, ok_result(&key_of(&store, &ids[1]), b"ok")],
        };

        let report = ConversionDispatcher::reconcile(&mut store, &prepared.ticket, &response);

        assert_eq!(store.get(&ids[0]).unwrap().error(), Some(DECODE_ERROR));
        assert_eq!(store.get(&ids[1]).unwrap().optimized_size(), 2);
        assert_eq!(report.succeeded_count(), 1);
    }

    #[test]
    fn test_result_without_payload_or_error_fails() {
        let (mut store, ids) = store_with(vec![("a.gif", vec![0; 10])]);
        let prepared = ConversionDispatcher::prepare(&mut store, Settings::default()).unwrap();
        let response = BatchResponse {
            results: vec![FileResult {
                filename: key_of(&store, &ids[0]),
                original_size: Some(10),
                optimized_data: None,
                optimized_size: None,
                error: None,
            }],
        };

        ConversionDispatcher::reconcile(&mut store, &prepared.ticket, &response);
        assert_eq!(store.get(&ids[0]).unwrap().error(), Some(OPTIMIZATION_FAILED));
    }

    #[test]
    fn test_sanitized_key_fallback() {
        let (mut store, ids) = store_with(vec![("my cat (1).gif", vec![0; 10])]);
        let prepared = ConversionDispatcher::prepare(&mut store, Settings::default()).unwrap();
        let key = key_of(&store, &ids[0]);
        let response = BatchResponse {
            results: vec![ok_result(&sanitized_key(&key), b"abc")],
        };

        ConversionDispatcher::reconcile(&mut store, &prepared.ticket, &response);
        assert_eq!(store.get(&ids[0]).unwrap().optimized_size(), 3);
    }

    #[test]
    fn test_sanitized_key() {
        assert_eq!(sanitized_key("1-00ab_my cat (1).gif"), "1-00ab_my_cat_1.gif");
        assert_eq!(sanitized_key("7-beef_../../etc/passwd"), "7-beef_.._.._etc_passwd");
        assert_eq!(sanitized_key("3-0001_plain.gif"), "3-0001_plain.gif");
        assert_eq!(sanitized_key("4-00c0_dir\\a.gif"), "4-00c0_dira.gif");
    }

    #[test]
    fn test_sanitized_key_decomposes_non_ascii() {
        assert_eq!(sanitized_key("1-00ab_café.gif"), "1-00ab_cafe.gif");
        assert_eq!(sanitized_key("2-00ab_ﬁle.gif"), "2-00ab_file.gif");
        assert_eq!(sanitized_key("3-00ab_ＡＢＣ.gif"), "3-00ab_ABC.gif");
        assert_eq!(sanitized_key("4-00ab_日本.gif"), "4-00ab_.gif");
    }

    #[test]
    fn test_accented_name_matches_its_result() {
        let (mut store, ids) = store_with(vec![("café.gif", vec![0; 10])]);
        let prepared = ConversionDispatcher::prepare(&mut store, Settings::default()).unwrap();
        let response = BatchResponse {
            results: vec![ok_result(&format!("{}_cafe.gif", ids[0]), b"abc")],
        };

        let report = ConversionDispatcher::reconcile(&mut store, &prepared.ticket, &response);
        assert_eq!(report.succeeded_count(), 1);
        assert_eq!(store.get(&ids[0]).unwrap().optimized_size(), 3);
    }

    #[test]
    fn test_entry_removed_mid_flight_is_dropped() {
        let (mut store, ids) = store_with(vec![("a.gif", vec![0; 10]), ("b.gif", vec![0; 10])]);
        let prepared = ConversionDispatcher::prepare(&mut store, Settings::default()).unwrap();
        let response = BatchResponse {
            results: vec![
                ok_result(&key_of(&store, &ids[0]), b"a"),
                ok_result(&key_of(&store, &ids[1]), b"b"),
            ],
        };

        store.remove(&ids[0]);
        let report = ConversionDispatcher::reconcile(&mut store, &prepared.ticket, &response);

        assert_eq!(report.dropped, vec![ids[0].clone()]);
        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(store.len(), 1);
        // one original + one optimized for the surviving entry
        assert_eq!(store.ledger().live_count(), 2);
    }

    #[test]
    fn test_entry_added_mid_flight_stays_idle() {
        let (mut store, ids) = store_with(vec![("a.gif", vec![0; 10])]);
        let prepared = ConversionDispatcher::prepare(&mut store, Settings::default()).unwrap();
        let response = BatchResponse {
            results: vec![ok_result(&key_of(&store, &ids[0]), b"a")],
        };

        let late = IngestionFilter::new("image/gif").accept(
            vec![SourceFile::new("late.gif", "image/gif", Bytes::from_static(b"late"))],
            &store.registered_keys(),
        );
        let late_ids = store.add_all(late.accepted);

        let report = ConversionDispatcher::reconcile(&mut store, &prepared.ticket, &response);

        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(store.get(&late_ids[0]).unwrap().status(), &EntryStatus::Idle);
    }

    #[test]
    fn test_settle_error_reverts_entries() {
        let (mut store, ids) = store_with(vec![("a.gif", vec![0; 10])]);
        let prepared = ConversionDispatcher::prepare(&mut store, Settings::default()).unwrap();

        let result = ConversionDispatcher::settle(
            &mut store,
            prepared.ticket,
            Err(OptimizeError::Transport("connection refused".into())),
        );

        assert!(result.is_err());
        assert_eq!(store.get(&ids[0]).unwrap().status(), &EntryStatus::Idle);
    }

    #[tokio::test]
    async fn test_run_batch_sends_one_multipart_request() {
        let mut server = Server::new_async().await;
        let (mut store, ids) = store_with(vec![("a.gif", b"GIF89a-a".to_vec()), ("b.gif", b"GIF89a-b".to_vec())]);
        let key_a = key_of(&store, &ids[0]);
        let key_b = key_of(&store, &ids[1]);

        let body = json!({
            "results": [
                { "filename": key_b.as_str(), "original_size": 8, "optimized_data": b64(b"b"), "optimized_size": 1, "error": null },
                { "filename": key_a.as_str(), "original_size": 8, "optimized_data": b64(b"aa"), "optimized_size": 2, "error": null }
            ]
        });
        let mock = server
            .mock("POST", "/api/optimize-gif")
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex(r#"name="lossy"\s+150"#.to_string()),
                Matcher::Regex(r#"name="colors"\s+32"#.to_string()),
                Matcher::Regex(format!(r#"name="file"; filename="{}""#, regex::escape(&key_a))),
                Matcher::Regex(format!(r#"name="file"; filename="{}""#, regex::escape(&key_b))),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .expect(1)
            .create_async()
            .await;

        let report = dispatcher_for(&server)
            .run_batch(&mut store, Settings::new(150, 32))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(report.succeeded_count(), 2);
        assert_eq!(store.get(&ids[0]).unwrap().optimized_size(), 2);
        assert_eq!(store.get(&ids[1]).unwrap().optimized_size(), 1);
    }

    #[tokio::test]
    async fn test_rejected_request_surfaces_server_reason() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/optimize-gif")
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error": "bad request"}"#)
            .create_async()
            .await;

        let (mut store, ids) = store_with(vec![("a.gif", vec![0; 10])]);
        let err = dispatcher_for(&server)
            .run_batch(&mut store, Settings::default())
            .await
            .unwrap_err();

        mock.assert_async().await;
        assert!(err.to_string().contains("bad request"));
        assert_eq!(store.get(&ids[0]).unwrap().status(), &EntryStatus::Idle);
    }

    #[tokio::test]
    async fn test_rejected_request_without_json_uses_status_code() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/optimize-gif")
            .with_status(502)
            .with_body("<html>Bad Gateway</html>")
            .create_async()
            .await;

        let (mut store, _) = store_with(vec![("a.gif", vec![0; 10])]);
        let err = dispatcher_for(&server)
            .run_batch(&mut store, Settings::default())
            .await
            .unwrap_err();

        match err {
            OptimizeError::Server { status, message } => {
                assert_eq!(status, 502);
                assert!(message.contains("502"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_success_body_is_batch_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/optimize-gif")
            .with_status(200)
            .with_body(r#"{"unexpected": true}"#)
            .create_async()
            .await;

        let (mut store, ids) = store_with(vec![("a.gif", vec![0; 10])]);
        let err = dispatcher_for(&server)
            .run_batch(&mut store, Settings::default())
            .await
            .unwrap_err();

        assert!(matches!(err, OptimizeError::MalformedResponse(_)));
        assert!(err.is_transport());
        assert_eq!(store.get(&ids[0]).unwrap().status(), &EntryStatus::Idle);
    }
}
