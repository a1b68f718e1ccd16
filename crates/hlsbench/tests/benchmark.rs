use axum::Router;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use hlsbench_engine::{BenchConfig, BenchError, Benchmark, USER_AGENT};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;

const SEGMENT_SIZE: usize = 1000;

#[derive(Debug, Clone)]
struct SeenRequest {
    name: String,
    range: Option<String>,
    user_agent: Option<String>,
}

/// In-process origin serving playlists and segments from `/live/`.
#[derive(Clone, Default)]
struct Origin {
    seen: Arc<Mutex<Vec<SeenRequest>>>,
    live_polls: Arc<AtomicUsize>,
}

impl Origin {
    fn record(&self, name: &str, headers: &HeaderMap) {
        let text = |key: header::HeaderName| {
            headers
                .get(key)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned)
        };
        self.seen.lock().push(SeenRequest {
            name: name.to_string(),
            range: text(header::RANGE),
            user_agent: text(header::USER_AGENT),
        });
    }

    fn requests(&self) -> Vec<SeenRequest> {
        self.seen.lock().clone()
    }

    fn segment_requests(&self) -> Vec<SeenRequest> {
        self.requests()
            .into_iter()
            .filter(|r| !r.name.ends_with(".m3u8"))
            .collect()
    }
}

fn playlist(target: u64, entries: &[&str], closed: bool) -> String {
    let mut text = format!("#EXTM3U\n#EXT-X-VERSION:4\n#EXT-X-TARGETDURATION:{target}\n");
    for entry in entries {
        text.push_str(entry);
        text.push('\n');
    }
    if closed {
        text.push_str("#EXT-X-ENDLIST\n");
    }
    text
}

fn manifest_response(body: String) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/vnd.apple.mpegurl")],
        body,
    )
        .into_response()
}

fn manifest(origin: &Origin, name: &str) -> Response {
    match name {
        "vod.m3u8" => manifest_response(playlist(
            4,
            &["#EXTINF:4.0,", "seg0.ts", "#EXTINF:4.0,", "seg1.ts", "#EXTINF:4.0,", "seg2.ts"],
            true,
        )),
        "ranges.m3u8" => manifest_response(playlist(
            4,
            &[
                "#EXTINF:4.0,",
                "#EXT-X-BYTERANGE:100@0",
                "all.ts",
                "#EXTINF:4.0,",
                "#EXT-X-BYTERANGE:50",
                "all.ts",
            ],
            true,
        )),
        "holes.m3u8" => manifest_response(playlist(
            4,
            &["#EXTINF:4.0,", "seg0.ts", "#EXTINF:4.0,", "gone.ts", "#EXTINF:4.0,", "seg2.ts"],
            true,
        )),
        "live.m3u8" => {
            let entries: &[&str] = if origin.live_polls.fetch_add(1, Ordering::SeqCst) == 0 {
                &["#EXTINF:1.0,", "live0.ts"]
            } else {
                &["#EXTINF:1.0,", "live0.ts", "#EXTINF:1.0,", "live1.ts"]
            };
            let closed = entries.len() > 2;
            manifest_response(playlist(1, entries, closed))
        }
        "flaky.m3u8" => {
            if origin.live_polls.fetch_add(1, Ordering::SeqCst) == 0 {
                StatusCode::SERVICE_UNAVAILABLE.into_response()
            } else {
                manifest_response(playlist(4, &["#EXTINF:4.0,", "seg0.ts"], true))
            }
        }
        "master.m3u8" => manifest_response(
            "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=1280000\nlow/index.m3u8\n".to_string(),
        ),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

fn segment(name: &str, headers: &HeaderMap) -> Response {
    if name == "gone.ts" {
        return StatusCode::NOT_FOUND.into_response();
    }

    let body = vec![0x47u8; SEGMENT_SIZE];
    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("bytes="))
        .and_then(|v| v.split_once('-'));

    match range {
        Some((start, end)) => {
            let start = start.parse::<usize>().unwrap_or(0).min(SEGMENT_SIZE);
            let end = end
                .parse::<usize>()
                .map(|e| e + 1)
                .unwrap_or(SEGMENT_SIZE)
                .clamp(start, SEGMENT_SIZE);
            (StatusCode::PARTIAL_CONTENT, body[start..end].to_vec()).into_response()
        }
        None => (StatusCode::OK, body).into_response(),
    }
}

async fn serve(
    State(origin): State<Origin>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Response {
    origin.record(&name, &headers);
    if name.ends_with(".m3u8") {
        manifest(&origin, &name)
    } else {
        segment(&name, &headers)
    }
}

async fn spawn_origin() -> (String, Origin) {
    let origin = Origin::default();
    let app = Router::new()
        .route("/live/{name}", get(serve))
        .with_state(origin.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}/live"), origin)
}

fn benchmark() -> Benchmark {
    Benchmark::new(BenchConfig::default()).unwrap()
}

#[tokio::test]
async fn vod_playlist_records_one_sample_per_segment() {
    let (base, origin) = spawn_origin().await;

    let summary = benchmark().run(&format!("{base}/vod.m3u8")).await.unwrap();

    assert_eq!(summary.len(), 3);
    let names: Vec<String> = origin.requests().into_iter().map(|r| r.name).collect();
    assert_eq!(names, ["vod.m3u8", "seg0.ts", "seg1.ts", "seg2.ts"]);

    let averages = summary.averages().unwrap();
    assert!(averages.total >= averages.start_transfer);
    assert!(averages.start_transfer >= averages.pretransfer);
}

#[tokio::test]
async fn requests_carry_user_agent_and_range() {
    let (base, origin) = spawn_origin().await;

    benchmark().run(&format!("{base}/ranges.m3u8")).await.unwrap();

    let requests = origin.requests();
    assert!(
        requests
            .iter()
            .all(|r| r.user_agent.as_deref() == Some(USER_AGENT))
    );

    let ranges: Vec<Option<String>> = origin
        .segment_requests()
        .into_iter()
        .map(|r| r.range)
        .collect();
    assert_eq!(
        ranges,
        [
            Some("bytes=0-99".to_string()),
            Some("bytes=100-149".to_string())
        ]
    );
}

#[tokio::test]
async fn whole_segments_send_open_ended_range() {
    let (base, origin) = spawn_origin().await;

    benchmark().run(&format!("{base}/vod.m3u8")).await.unwrap();

    assert!(
        origin
            .segment_requests()
            .iter()
            .all(|r| r.range.as_deref() == Some("bytes=0-"))
    );
}

#[tokio::test]
async fn missing_segment_is_skipped_and_later_segments_still_download() {
    let (base, origin) = spawn_origin().await;

    let summary = benchmark().run(&format!("{base}/holes.m3u8")).await.unwrap();

    assert_eq!(summary.len(), 2);
    let names: Vec<String> = origin
        .segment_requests()
        .into_iter()
        .map(|r| r.name)
        .collect();
    assert_eq!(names, ["seg0.ts", "gone.ts", "seg2.ts"]);
}

#[tokio::test]
async fn live_playlist_is_polled_until_closed() {
    let (base, origin) = spawn_origin().await;

    let summary = benchmark().run(&format!("{base}/live.m3u8")).await.unwrap();

    assert_eq!(origin.live_polls.load(Ordering::SeqCst), 2);
    assert_eq!(summary.len(), 2);
    let names: Vec<String> = origin
        .segment_requests()
        .into_iter()
        .map(|r| r.name)
        .collect();
    assert_eq!(names, ["live0.ts", "live1.ts"]);
}

#[tokio::test]
async fn overloaded_manifest_is_retried() {
    let (base, origin) = spawn_origin().await;
    let config = BenchConfig {
        poll_retry_delay: Duration::from_millis(50),
        ..BenchConfig::default()
    };

    let summary = Benchmark::new(config)
        .unwrap()
        .run(&format!("{base}/flaky.m3u8"))
        .await
        .unwrap();

    assert_eq!(origin.live_polls.load(Ordering::SeqCst), 2);
    assert_eq!(summary.len(), 1);
}

#[tokio::test]
async fn scratch_file_mode_still_records_samples() {
    let (base, _origin) = spawn_origin().await;
    let config = BenchConfig {
        scratch_file: true,
        ..BenchConfig::default()
    };

    let summary = Benchmark::new(config)
        .unwrap()
        .run(&format!("{base}/vod.m3u8"))
        .await
        .unwrap();

    assert_eq!(summary.len(), 3);
}

#[tokio::test]
async fn master_playlist_is_fatal() {
    let (base, _origin) = spawn_origin().await;

    let err = benchmark()
        .run(&format!("{base}/master.m3u8"))
        .await
        .unwrap_err();

    assert!(matches!(err, BenchError::NotMediaPlaylist { .. }));
}

#[tokio::test]
async fn missing_manifest_is_fatal() {
    let (base, _origin) = spawn_origin().await;

    let err = benchmark()
        .run(&format!("{base}/nothing-here.m3u8"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        BenchError::HttpStatus { status, .. } if status == StatusCode::NOT_FOUND
    ));
}
