//! A small calculator service.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic [config.toml]
//!
//! Try:
//!   curl http://localhost:8080/add/2/40
//!   curl -X POST http://localhost:8080/divide \
//!        -H 'content-type: application/json' \
//!        -d '{"left":10,"right":0}'
//!   curl -X POST http://localhost:8080/divide -d '{oops'
//!   curl 'http://localhost:8080/sum?n=1&n=2&n=3'
//!   curl -H 'x-api-key: nope' http://localhost:8080/admin/stats

use http::{Method, StatusCode};
use keel::middleware::RequireHeader;
use keel::{Application, Config, Context, Error, Result};
use regex::Regex;
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

#[derive(Deserialize)]
struct Operands {
    left: i64,
    right: i64,
}

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(&path).unwrap_or_else(|e| {
            eprintln!("cannot load {path}: {e}");
            std::process::exit(1);
        }),
        None => Config { name: "calc".to_owned(), ..Config::default() },
    };
    let addr = config.addr.clone();

    let admin_key = Regex::new("^secret$").expect("static regex");

    Application::from_config(&config)
        .register(RequireHeader::new("x-api-key", admin_key, StatusCode::UNAUTHORIZED)
            .for_paths(Regex::new("^/admin").expect("static regex")))
        .mount(Method::GET,  "/add/{left}/{right}", "operands", "add",    add)
        .mount(Method::POST, "/divide",             "operands", "divide", divide)
        .mount(Method::GET,  "/sum",                "operands", "sum",    sum)
        .mount(Method::GET,  "/admin/stats",        "admin",    "stats",  stats)
        .serve(&addr)
        .await;
}

fn overflow() -> Error {
    Error::bad_request("validation", "result out of range")
}

fn operand(ctx: &Context, name: &str) -> Result<i64> {
    let raw = ctx.param(name).unwrap_or_default();
    raw.parse().map_err(|_| {
        Error::bad_request("validation", format!("{name} must be an integer, got {raw:?}"))
    })
}

async fn add(ctx: Context) -> Result<()> {
    let left = operand(&ctx, "left")?;
    let right = operand(&ctx, "right")?;
    let total = left.checked_add(right).ok_or_else(overflow)?;
    ctx.json(StatusCode::OK, &total)
}

async fn divide(ctx: Context) -> Result<()> {
    let Operands { left, right } = ctx
        .payload_as()?
        .ok_or_else(|| Error::bad_request("validation", "missing operands"))?;
    if right == 0 {
        return Err(Error::bad_request("validation", "division by zero"));
    }
    let quotient = left.checked_div(right).ok_or_else(overflow)?;
    ctx.json(StatusCode::OK, &quotient)
}

async fn sum(ctx: Context) -> Result<()> {
    let mut total = 0i64;
    for n in ctx.query_all("n") {
        let n = n
            .parse::<i64>()
            .map_err(|_| Error::bad_request("validation", format!("not an integer: {n:?}")))?;
        total = total.checked_add(n).ok_or_else(overflow)?;
    }
    ctx.json(StatusCode::OK, &total)
}

async fn stats(ctx: Context) -> Result<()> {
    ctx.json(StatusCode::OK, &serde_json::json!({ "request_id": ctx.request_id() }))
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http_body_util::{BodyExt, Full};

    use super::*;

    async fn call(
        handler: impl keel::IntoHandler,
        req: http::Request<Full<Bytes>>,
        params: &[(&str, &str)],
    ) -> (StatusCode, Bytes) {
        let endpoint = Application::new("calc").bind("operands", "test", handler);
        let params = params.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        let res = endpoint.call(req, params).await;
        let status = res.status();
        (status, res.into_body().collect().await.unwrap().to_bytes())
    }

    fn post(body: &'static str) -> http::Request<Full<Bytes>> {
        http::Request::post("/divide")
            .body(Full::new(Bytes::from_static(body.as_bytes())))
            .unwrap()
    }

    fn get(uri: &str) -> http::Request<Full<Bytes>> {
        http::Request::get(uri).body(Full::new(Bytes::new())).unwrap()
    }

    #[tokio::test]
    async fn divide_rejects_overflowing_quotient() {
        let min_by_minus_one = post(r#"{"left":-9223372036854775808,"right":-1}"#);
        let (status, body) = call(divide, min_by_minus_one, &[]).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body,
            Bytes::from_static(br#"{"kind":"validation","msg":"result out of range"}"#)
        );

        let (status, body) = call(divide, post(r#"{"left":9,"right":-2}"#), &[]).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, Bytes::from_static(b"-4"));
    }

    #[tokio::test]
    async fn add_rejects_overflowing_sum() {
        let params = [("left", "9223372036854775807"), ("right", "1")];
        let (status, _) = call(add, get("/add"), &params).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(add, get("/add"), &[("left", "2"), ("right", "40")]).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, Bytes::from_static(b"42"));
    }

    #[tokio::test]
    async fn sum_rejects_overflowing_total() {
        let (status, _) = call(sum, get("/sum?n=9223372036854775807&n=1"), &[]).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(sum, get("/sum?n=1&n=2&n=3"), &[]).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, Bytes::from_static(b"6"));
    }
}
