//! Minimal `/metrics` HTTP server exposing the process-wide
//! `prometheus::default_registry()`, spawned when `--metrics-port` is set.

use hyper::body::Bytes;
use hyper::service::service_fn;
use hyper::{Request, Response};
use owo_colors::OwoColorize;
use prometheus::{Encoder, TextEncoder};
use tokio::net::TcpListener;

pub async fn run_server(port: u16) {
    let addr = format!("0.0.0.0:{port}");
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err) => {
            eprintln!("{}", format!("failed to bind metrics server to {addr}: {err}").red());
            return;
        }
    };
    println!("{}", format!("metrics server listening on {addr}").green());

    loop {
        let (stream, _) = match listener.accept().await {
            Ok(pair) => pair,
            Err(err) => {
                eprintln!("{}", format!("metrics server accept error: {err}").red());
                continue;
            }
        };
        tokio::spawn(async move {
            let io = hyper_util::rt::TokioIo::new(stream);
            let service = service_fn(|_req: Request<hyper::body::Incoming>| async move { handle().await });
            if let Err(err) = hyper::server::conn::http1::Builder::new().serve_connection(io, service).await {
                eprintln!("{}", format!("metrics connection error: {err}").red());
            }
        });
    }
}

async fn handle() -> Result<Response<http_body_util::Full<Bytes>>, std::convert::Infallible> {
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    encoder.encode(&metric_families, &mut buffer).expect("encode metrics");
    Ok(Response::new(http_body_util::Full::new(Bytes::from(buffer))))
}
