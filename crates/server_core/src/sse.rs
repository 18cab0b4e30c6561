use axum::{body::Body, response::Response};
use futures::{Stream, StreamExt};
use std::convert::Infallible;
use tokio::sync::mpsc::Receiver;
use tokio_stream::wrappers::ReceiverStream;

pub struct RawSse<S>(S);

impl<S> RawSse<S>
where
  S: Stream<Item = String> + Send + 'static,
{
  pub fn new(stream: S) -> Self {
    RawSse(stream)
  }

  pub fn into_response(self) -> Response {
    let body = Body::from_stream(self.0.map(Ok::<_, Infallible>));
    Response::builder()
      .header("Content-Type", "text/event-stream")
      .header("Cache-Control", "no-cache")
      .body(body)
      .unwrap()
  }
}

/// Streams pre-formatted SSE frames from a session channel.
pub fn fwd_sse(rx: Receiver<String>) -> Response {
  let stream = ReceiverStream::new(rx);
  RawSse::new(stream).into_response()
}

#[cfg(test)]
mod tests {
  use super::fwd_sse;
  use axum::{
    body::Body,
    http::{Request, StatusCode},
    routing::get,
    Router,
  };
  use http_body_util::BodyExt;
  use pretty_assertions::assert_eq;
  use tokio::sync::mpsc;
  use tower::ServiceExt;

  #[tokio::test]
  async fn test_fwd_sse_streams_frames() -> anyhow::Result<()> {
    let app = Router::new().route(
      "/sse",
      get(|| async {
        let (tx, rx) = mpsc::channel::<String>(10);
        tokio::spawn(async move {
          for i in 1..=2 {
            tx.send(format!("event: message\ndata: {i}\n\n")).await.unwrap();
          }
        });
        fwd_sse(rx)
      }),
    );

    let response = app
      .oneshot(Request::get("/sse").body(Body::empty())?)
      .await?;
    assert_eq!(StatusCode::OK, response.status());
    assert_eq!("text/event-stream", response.headers()["content-type"]);
    let bytes = response.into_body().collect().await?.to_bytes();
    assert_eq!(
      "event: message\ndata: 1\n\nevent: message\ndata: 2\n\n",
      String::from_utf8_lossy(&bytes)
    );
    Ok(())
  }
}
