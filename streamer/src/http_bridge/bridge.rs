use crate::http_bridge::model::{MapReport, StatusReport};
use anyhow::{Context, Result};
use log::{info, warn};
use serde_json::json;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tactilecore::FramePublisher;
use warp::filters::BoxedFilter;
use warp::http::header::{HeaderValue, CACHE_CONTROL, CONTENT_TYPE};
use warp::http::StatusCode;
use warp::hyper::body::{Body, Bytes};
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

const BOUNDARY: &str = "frame";
const MJPEG_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>Tactile Viewer</title>
    <style>
      html, body { height: 100%; margin: 0; background: #111; color: #ddd; font-family: sans-serif; }
      .wrap { min-height: 100vh; display: flex; flex-direction: column; justify-content: center; align-items: center; gap: 12px; }
      .frame { border: 1px solid #333; background: #000; object-fit: contain; }
      @media (max-aspect-ratio: 1/1) { .frame { width: 96vw; height: 96vw; } }
      @media (min-aspect-ratio: 1/1) { .frame { width: 96vh; height: 96vh; } }
    </style>
  </head>
  <body>
    <div class="wrap">
      <img class="frame" src="/stream" alt="Contact map" />
    </div>
  </body>
</html>
"#;

/// Wraps one JPEG as a part of the `multipart/x-mixed-replace` stream.
pub fn multipart_part(jpeg: &[u8]) -> Bytes {
    let header = format!("--{}\r\nContent-Type: image/jpeg\r\n\r\n", BOUNDARY);
    let mut part = Vec::with_capacity(header.len() + jpeg.len() + 2);
    part.extend_from_slice(header.as_bytes());
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n");
    Bytes::from(part)
}

fn json_reply<T: serde::Serialize>(value: &T, status: StatusCode) -> Response {
    warp::reply::with_status(warp::reply::json(value), status).into_response()
}

fn not_ready(publisher: &FramePublisher) -> Response {
    json_reply(
        &json!({ "status": publisher.handle().status() }),
        StatusCode::SERVICE_UNAVAILABLE,
    )
}

async fn stream(publisher: Arc<FramePublisher>) -> Result<Response, Rejection> {
    let (mut sender, body) = Body::channel();
    let mut subscriber = publisher.subscribe();

    tokio::spawn(async move {
        info!("Stream client connected");
        loop {
            match subscriber.next_frame().await {
                Ok(Some(frame)) => {
                    if sender.send_data(multipart_part(&frame.jpeg)).await.is_err() {
                        info!("Client disconnected from stream");
                        break;
                    }
                }
                Ok(None) => {
                    info!("Producer stopped; closing stream");
                    break;
                }
                Err(err) => warn!("frame skipped: {}", err),
            }
        }
    });

    let mut response = Response::new(body);
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(MJPEG_CONTENT_TYPE));
    response
        .headers_mut()
        .insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    Ok(response)
}

async fn latest_frame(publisher: Arc<FramePublisher>) -> Result<Response, Rejection> {
    match publisher.latest_frame() {
        Ok(Some(frame)) => {
            let mut response = Response::new(Body::from(frame.jpeg.clone()));
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("image/jpeg"));
            response
                .headers_mut()
                .insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
            Ok(response)
        }
        Ok(None) => Ok(not_ready(&publisher)),
        Err(err) => {
            warn!("frame.jpg render error: {}", err);
            Ok(json_reply(
                &json!({ "error": err.to_string() }),
                StatusCode::INTERNAL_SERVER_ERROR,
            ))
        }
    }
}

async fn latest_map(publisher: Arc<FramePublisher>) -> Result<Response, Rejection> {
    match publisher.handle().latest() {
        Some(snapshot) => Ok(json_reply(&MapReport::from(&*snapshot), StatusCode::OK)),
        None => Ok(not_ready(&publisher)),
    }
}

async fn status(publisher: Arc<FramePublisher>) -> Result<Response, Rejection> {
    let handle = publisher.handle();
    let report = StatusReport {
        status: handle.status(),
        latest_sequence: handle.latest().map(|snapshot| snapshot.sequence),
        metrics: handle.metrics().snapshot(),
    };
    Ok(json_reply(&report, StatusCode::OK))
}

async fn recalibrate(publisher: Arc<FramePublisher>) -> Result<Response, Rejection> {
    publisher.handle().request_recalibration();
    info!("Recalibration requested over HTTP");
    Ok(json_reply(
        &json!({ "status": "recalibration requested" }),
        StatusCode::ACCEPTED,
    ))
}

/// HTTP front end: MJPEG stream, single frames, map and status JSON.
pub struct HttpBridge {
    publisher: Arc<FramePublisher>,
}

impl HttpBridge {
    pub fn new(publisher: Arc<FramePublisher>) -> Self {
        Self { publisher }
    }

    pub fn routes(&self) -> BoxedFilter<(Response,)> {
        let publisher = self.publisher.clone();
        let with_publisher = warp::any().map(move || publisher.clone());

        let index = warp::path::end()
            .and(warp::get())
            .map(|| warp::reply::html(INDEX_HTML).into_response());

        let stream_route = warp::path("stream")
            .and(warp::path::end())
            .and(warp::get())
            .and(with_publisher.clone())
            .and_then(stream);

        let frame_route = warp::path("frame.jpg")
            .and(warp::path::end())
            .and(warp::get())
            .and(with_publisher.clone())
            .and_then(latest_frame);

        let map_route = warp::path("map")
            .and(warp::path::end())
            .and(warp::get())
            .and(with_publisher.clone())
            .and_then(latest_map);

        let status_route = warp::path("status")
            .and(warp::path::end())
            .and(warp::get())
            .and(with_publisher.clone())
            .and_then(status);

        let recalibrate_route = warp::path("recalibrate")
            .and(warp::path::end())
            .and(warp::post())
            .and(with_publisher)
            .and_then(recalibrate);

        index
            .or(stream_route)
            .unify()
            .or(frame_route)
            .unify()
            .or(map_route)
            .unify()
            .or(status_route)
            .unify()
            .or(recalibrate_route)
            .unify()
            .boxed()
    }

    /// Serves until `shutdown` resolves.
    pub async fn serve<F>(self, bind: SocketAddr, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (addr, server) = warp::serve(self.routes())
            .try_bind_with_graceful_shutdown(bind, shutdown)
            .with_context(|| format!("binding HTTP bridge to {}", bind))?;
        info!("Starting web UI at http://{}", addr);
        server.await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tactilecore::acquisition::Frame;
    use tactilecore::telemetry::MetricsRecorder;
    use tactilecore::{Pipeline, PipelineConfig};

    fn pipeline() -> (Pipeline, Arc<FramePublisher>) {
        let mut config = PipelineConfig::default();
        config.sensor.rows = 4;
        config.sensor.cols = 4;
        config.calibration.frames = 1;
        config.output.size = Some(16);
        let pipeline = Pipeline::new(config.clone(), Arc::new(MetricsRecorder::new())).unwrap();
        let publisher = Arc::new(FramePublisher::new(pipeline.handle(), &config));
        (pipeline, publisher)
    }

    fn prime(pipeline: &mut Pipeline) {
        let shape = pipeline.config().shape();
        pipeline.process_frame(&Frame::filled(&shape, 10)).unwrap();
        pipeline.process_frame(&Frame::filled(&shape, 40)).unwrap();
    }

    #[test]
    fn multipart_part_frames_jpeg() {
        let part = multipart_part(&[0xFF, 0xD8, 0xFF, 0xD9]);
        assert!(part.starts_with(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n"));
        assert!(part.ends_with(&[0xFF, 0xD9, b'\r', b'\n']));
    }

    #[tokio::test]
    async fn endpoints_report_not_ready_before_calibration() {
        let (_pipeline, publisher) = pipeline();
        let routes = HttpBridge::new(publisher).routes();

        let res = warp::test::request().path("/map").reply(&routes).await;
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["status"]["state"], "calibrating");

        let res = warp::test::request().path("/frame.jpg").reply(&routes).await;
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn frame_and_map_serve_latest_snapshot() {
        let (mut pipeline, publisher) = pipeline();
        prime(&mut pipeline);
        let routes = HttpBridge::new(publisher).routes();

        let res = warp::test::request().path("/frame.jpg").reply(&routes).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()[CONTENT_TYPE], "image/jpeg");
        assert_eq!(&res.body()[..2], &[0xFF, 0xD8]);

        let res = warp::test::request().path("/map").reply(&routes).await;
        assert_eq!(res.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["sequence"], 1);
        assert_eq!(body["rows"], 4);
        assert_eq!(body["values"].as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn status_includes_metrics() {
        let (mut pipeline, publisher) = pipeline();
        prime(&mut pipeline);
        let routes = HttpBridge::new(publisher).routes();

        let res = warp::test::request().path("/status").reply(&routes).await;
        assert_eq!(res.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["status"]["state"], "streaming");
        assert_eq!(body["latest_sequence"], 1);
        assert_eq!(body["metrics"]["frames_processed"], 1);
    }

    #[tokio::test]
    async fn recalibrate_requires_post() {
        let (_pipeline, publisher) = pipeline();
        let routes = HttpBridge::new(publisher).routes();

        let res = warp::test::request()
            .method("POST")
            .path("/recalibrate")
            .reply(&routes)
            .await;
        assert_eq!(res.status(), StatusCode::ACCEPTED);

        let res = warp::test::request().path("/recalibrate").reply(&routes).await;
        assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn index_embeds_stream() {
        let (_pipeline, publisher) = pipeline();
        let routes = HttpBridge::new(publisher).routes();
        let res = warp::test::request().path("/").reply(&routes).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert!(std::str::from_utf8(res.body()).unwrap().contains("/stream"));
    }
}
