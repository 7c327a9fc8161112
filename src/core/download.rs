//! Single-transfer HTTP downloader with progress events.
//!
//! A `Downloader` manages at most one active transfer. Starting a new transfer
//! abandons the one in flight: its cancel flag is raised and its remaining
//! events are suppressed. Every worker-side send first reserves channel
//! capacity and then checks the transfer generation under a lock, the same
//! lock `launch` bumps the generation under, so a replaced transfer can never
//! slip a stale event past the check. The caller observes exactly one
//! terminal event per observed transfer.

use crate::error::{FerryError, Result};
use futures_util::StreamExt;
use log::{debug, warn};
use reqwest::{Client, Url};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

/// Write buffer size for downloads (256 KiB); progress is sampled on each
/// buffer flush rather than on every chunk.
const WRITE_BUFFER_SIZE: usize = 256 * 1024;

/// Events observed on a downloader's channel: zero or more `Progress` values
/// in non-decreasing order, then exactly one terminal event.
#[derive(Debug)]
pub enum DownloadEvent {
    Progress(f32),
    Completed(PathBuf),
    Failed(FerryError),
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadState {
    Idle,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl DownloadState {
    fn as_u8(self) -> u8 {
        match self {
            DownloadState::Idle => 0,
            DownloadState::InProgress => 1,
            DownloadState::Completed => 2,
            DownloadState::Failed => 3,
            DownloadState::Cancelled => 4,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => DownloadState::InProgress,
            2 => DownloadState::Completed,
            3 => DownloadState::Failed,
            4 => DownloadState::Cancelled,
            _ => DownloadState::Idle,
        }
    }
}

enum FetchOutcome {
    Done(PathBuf),
    Cancelled,
}

pub struct Downloader {
    url: Url,
    allow_insecure_ssl_certificate: bool,
    events: mpsc::Sender<DownloadEvent>,
    state: Arc<AtomicU8>,
    generation: Arc<Mutex<u64>>,
    cancel_flag: Option<Arc<AtomicBool>>,
}

impl Downloader {
    /// Create a downloader bound to `url` together with its event channel.
    /// Nothing is transferred until [`start_download`] is called.
    ///
    /// [`start_download`]: Self::start_download
    pub fn new(url: Url) -> (Self, mpsc::Receiver<DownloadEvent>) {
        let (events, receiver) = mpsc::channel(64);

        let downloader = Self {
            url,
            allow_insecure_ssl_certificate: false,
            events,
            state: Arc::new(AtomicU8::new(DownloadState::Idle.as_u8())),
            generation: Arc::new(Mutex::new(0)),
            cancel_flag: None,
        };

        (downloader, receiver)
    }

    /// The currently bound URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn state(&self) -> DownloadState {
        DownloadState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Accept otherwise-invalid TLS certificates for transfers started after
    /// this call. Scoped to this instance only.
    pub fn set_allow_insecure_ssl_certificate(&mut self, allow: bool) {
        self.allow_insecure_ssl_certificate = allow;
    }

    pub fn allow_insecure_ssl_certificate(&self) -> bool {
        self.allow_insecure_ssl_certificate
    }

    /// Start transferring the bound resource. Requires a tokio runtime.
    ///
    /// Calling this while a transfer is in flight replaces that transfer, the
    /// same way [`start_next`] does.
    ///
    /// [`start_next`]: Self::start_next
    pub fn start_download(&mut self) {
        self.launch();
    }

    /// Abandon any in-flight transfer and start a new one against `url`,
    /// reusing the same event channel.
    pub fn start_next(&mut self, url: Url) {
        self.url = url;
        self.launch();
    }

    /// Request termination of the active transfer. The worker removes the
    /// partial artifact and delivers `Cancelled` as the terminal event; no
    /// progress events follow it. A no-op when nothing is in flight.
    pub fn cancel(&mut self) {
        if let Some(flag) = &self.cancel_flag {
            flag.store(true, Ordering::SeqCst);
        }
    }

    fn launch(&mut self) {
        // Abandon the previous transfer: raise its cancel flag, then bump the
        // generation under the send lock so the old worker cannot deliver a
        // stale event once the bump is visible.
        if let Some(flag) = self.cancel_flag.take() {
            flag.store(true, Ordering::SeqCst);
        }
        let generation = {
            let mut guard = lock_generation(&self.generation);
            *guard += 1;
            self.state
                .store(DownloadState::InProgress.as_u8(), Ordering::SeqCst);
            *guard
        };

        let cancel_flag = Arc::new(AtomicBool::new(false));
        self.cancel_flag = Some(cancel_flag.clone());

        let url = self.url.clone();
        let insecure = self.allow_insecure_ssl_certificate;
        let events = self.events.clone();
        let state = self.state.clone();
        let current_generation = self.generation.clone();

        tokio::spawn(async move {
            let outcome = fetch(
                url,
                insecure,
                &cancel_flag,
                &events,
                &current_generation,
                generation,
            )
            .await;

            let (next_state, event) = match outcome {
                Ok(FetchOutcome::Done(location)) => {
                    (DownloadState::Completed, DownloadEvent::Completed(location))
                }
                Ok(FetchOutcome::Cancelled) => (DownloadState::Cancelled, DownloadEvent::Cancelled),
                Err(error) => {
                    warn!("download failed: {}", error);
                    (DownloadState::Failed, DownloadEvent::Failed(error))
                }
            };

            // Reserve capacity first, then check-and-send atomically: a
            // replaced transfer must not deliver a stale terminal event, even
            // when the replacement happens mid-delivery.
            let permit = events.reserve().await.ok();
            let guard = lock_generation(&current_generation);
            if *guard == generation {
                state.store(next_state.as_u8(), Ordering::SeqCst);
                if let Some(permit) = permit {
                    permit.send(event);
                }
            }
        });
    }
}

impl Drop for Downloader {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn lock_generation(generation: &Mutex<u64>) -> MutexGuard<'_, u64> {
    generation.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Send an event only if `generation` is still the live transfer, holding the
/// generation lock across the send itself.
async fn send_if_current(
    events: &mpsc::Sender<DownloadEvent>,
    current_generation: &Mutex<u64>,
    generation: u64,
    event: DownloadEvent,
) {
    if let Ok(permit) = events.reserve().await {
        let guard = lock_generation(current_generation);
        if *guard == generation {
            permit.send(event);
        }
    }
}

async fn fetch(
    url: Url,
    insecure: bool,
    cancel_flag: &AtomicBool,
    events: &mpsc::Sender<DownloadEvent>,
    current_generation: &Mutex<u64>,
    generation: u64,
) -> Result<FetchOutcome> {
    let client = Client::builder()
        .danger_accept_invalid_certs(insecure)
        .build()?;

    let response = client.get(url.clone()).send().await?;
    if !response.status().is_success() {
        return Err(FerryError::HttpStatus {
            status: response.status().as_u16(),
            url: url.to_string(),
        });
    }

    let total = response.content_length().unwrap_or(0);
    let destination = temp_destination(&url);
    let mut file = File::create(&destination).await?;

    let mut stream = response.bytes_stream();
    let mut write_buffer = Vec::with_capacity(WRITE_BUFFER_SIZE);
    let mut downloaded: u64 = 0;
    let mut last_sent: f32 = 0.0;

    while let Some(chunk) = stream.next().await {
        if cancel_flag.load(Ordering::SeqCst) {
            drop(file);
            let _ = tokio::fs::remove_file(&destination).await;
            debug!("download cancelled for {}", url);
            return Ok(FetchOutcome::Cancelled);
        }

        let chunk = chunk?;
        write_buffer.extend_from_slice(&chunk);
        downloaded += chunk.len() as u64;

        if write_buffer.len() >= WRITE_BUFFER_SIZE {
            file.write_all(&write_buffer).await?;
            write_buffer.clear();

            if total > 0 {
                let fraction = ((downloaded as f64 / total as f64).min(1.0)) as f32;
                if fraction > last_sent {
                    last_sent = fraction;
                    send_if_current(
                        events,
                        current_generation,
                        generation,
                        DownloadEvent::Progress(fraction),
                    )
                    .await;
                }
            }
        }
    }

    if !write_buffer.is_empty() {
        file.write_all(&write_buffer).await?;
    }
    file.flush().await?;

    // One cancellation check after the last chunk so that a cancel raised
    // near the end still wins over completion.
    if cancel_flag.load(Ordering::SeqCst) {
        let _ = tokio::fs::remove_file(&destination).await;
        return Ok(FetchOutcome::Cancelled);
    }

    if last_sent < 1.0 {
        send_if_current(
            events,
            current_generation,
            generation,
            DownloadEvent::Progress(1.0),
        )
        .await;
    }

    Ok(FetchOutcome::Done(destination))
}

/// A uniquely named destination under the OS temp directory, keeping the
/// resource's file name recognizable.
fn temp_destination(url: &Url) -> PathBuf {
    let name = url
        .path_segments()
        .and_then(|segments| segments.last())
        .filter(|segment| !segment.is_empty())
        .unwrap_or("download");

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos())
        .unwrap_or(0);

    std::env::temp_dir().join(format!("fileferry-{}-{}", nanos, name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn serve(server: &MockServer, route: &str, body: Vec<u8>, delay: Option<Duration>) {
        let mut template = ResponseTemplate::new(200).set_body_bytes(body);
        if let Some(delay) = delay {
            template = template.set_delay(delay);
        }
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(template)
            .mount(server)
            .await;
    }

    fn route_url(server: &MockServer, route: &str) -> Url {
        Url::parse(&format!("{}{}", server.uri(), route)).unwrap()
    }

    #[tokio::test]
    async fn test_download_completes_with_body() {
        let server = MockServer::start().await;
        serve(&server, "/artifact.bin", b"ferry payload".to_vec(), None).await;

        let (mut downloader, mut receiver) = Downloader::new(route_url(&server, "/artifact.bin"));
        assert_eq!(downloader.state(), DownloadState::Idle);
        downloader.start_download();
        assert_eq!(downloader.state(), DownloadState::InProgress);

        let mut last_progress = 0.0f32;
        let location = loop {
            match receiver.recv().await.unwrap() {
                DownloadEvent::Progress(fraction) => {
                    assert!(fraction >= last_progress);
                    last_progress = fraction;
                }
                DownloadEvent::Completed(location) => break location,
                other => panic!("unexpected event: {:?}", other),
            }
        };

        assert_eq!(last_progress, 1.0);
        assert_eq!(downloader.state(), DownloadState::Completed);
        assert_eq!(std::fs::read(&location).unwrap(), b"ferry payload");
        let _ = std::fs::remove_file(&location);
    }

    #[tokio::test]
    async fn test_download_fails_on_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let (mut downloader, mut receiver) = Downloader::new(route_url(&server, "/missing"));
        downloader.start_download();

        match receiver.recv().await.unwrap() {
            DownloadEvent::Failed(FerryError::HttpStatus { status, .. }) => {
                assert_eq!(status, 404);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(downloader.state(), DownloadState::Failed);
    }

    #[tokio::test]
    async fn test_cancel_delivers_single_terminal_event() {
        let server = MockServer::start().await;
        serve(
            &server,
            "/slow.bin",
            vec![0u8; 64 * 1024],
            Some(Duration::from_millis(500)),
        )
        .await;

        let (mut downloader, mut receiver) = Downloader::new(route_url(&server, "/slow.bin"));
        downloader.start_download();
        tokio::time::sleep(Duration::from_millis(50)).await;
        downloader.cancel();

        match receiver.recv().await.unwrap() {
            DownloadEvent::Cancelled => {}
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(downloader.state(), DownloadState::Cancelled);

        // Nothing after the terminal event.
        let extra = tokio::time::timeout(Duration::from_millis(200), receiver.recv()).await;
        assert!(extra.is_err() || extra.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_start_next_replaces_inflight_transfer() {
        let server = MockServer::start().await;
        serve(
            &server,
            "/first.bin",
            b"first".to_vec(),
            Some(Duration::from_secs(2)),
        )
        .await;
        serve(&server, "/second.bin", b"second".to_vec(), None).await;

        let (mut downloader, mut receiver) = Downloader::new(route_url(&server, "/first.bin"));
        downloader.start_download();
        tokio::time::sleep(Duration::from_millis(100)).await;
        downloader.start_next(route_url(&server, "/second.bin"));

        let location = loop {
            match receiver.recv().await.unwrap() {
                DownloadEvent::Progress(_) => {}
                DownloadEvent::Completed(location) => break location,
                other => panic!("unexpected event: {:?}", other),
            }
        };
        assert_eq!(std::fs::read(&location).unwrap(), b"second");
        assert_eq!(downloader.state(), DownloadState::Completed);
        let _ = std::fs::remove_file(&location);

        // The abandoned transfer must not surface a second terminal event,
        // even after its delayed response arrives.
        let extra = tokio::time::timeout(Duration::from_secs(3), receiver.recv()).await;
        assert!(extra.is_err() || extra.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_rapid_replacement_never_duplicates_terminal_events() {
        let server = MockServer::start().await;
        for stage in 0..4 {
            serve(
                &server,
                &format!("/stage{}.bin", stage),
                vec![stage as u8; 1024],
                Some(Duration::from_millis(400)),
            )
            .await;
        }
        serve(&server, "/landed.bin", b"landed".to_vec(), None).await;

        // Replace the transfer while every stage is still in flight; the
        // workers race their terminal delivery against the replacement.
        let (mut downloader, mut receiver) = Downloader::new(route_url(&server, "/stage0.bin"));
        downloader.start_download();
        for stage in 1..4 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            downloader.start_next(route_url(&server, &format!("/stage{}.bin", stage)));
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        downloader.start_next(route_url(&server, "/landed.bin"));

        let location = loop {
            match receiver.recv().await.unwrap() {
                DownloadEvent::Progress(_) => {}
                DownloadEvent::Completed(location) => break location,
                other => panic!("unexpected event: {:?}", other),
            }
        };
        assert_eq!(std::fs::read(&location).unwrap(), b"landed");
        let _ = std::fs::remove_file(&location);

        // Long enough for every abandoned stage's delayed response to land;
        // none of them may surface a stale terminal event.
        let extra = tokio::time::timeout(Duration::from_millis(800), receiver.recv()).await;
        assert!(extra.is_err() || extra.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cancel_when_idle_is_a_noop() {
        let server = MockServer::start().await;
        let (mut downloader, mut receiver) = Downloader::new(route_url(&server, "/any"));
        downloader.cancel();
        assert_eq!(downloader.state(), DownloadState::Idle);

        let extra = tokio::time::timeout(Duration::from_millis(100), receiver.recv()).await;
        assert!(extra.is_err());
    }

    #[test]
    fn test_temp_destination_keeps_file_name() {
        let url = Url::parse("https://example.com/fonts/font.ttf").unwrap();
        let destination = temp_destination(&url);
        let name = destination.file_name().unwrap().to_string_lossy();
        assert!(name.starts_with("fileferry-"));
        assert!(name.ends_with("-font.ttf"));

        let bare = Url::parse("https://example.com/").unwrap();
        let fallback = temp_destination(&bare);
        assert!(fallback
            .file_name()
            .unwrap()
            .to_string_lossy()
            .ends_with("-download"));
    }
}
