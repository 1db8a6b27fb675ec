mod executor;
mod languages;
mod messages;
mod room;
mod server;

use std::convert::Infallible;
use std::sync::Arc;

use log::info;
use warp::http::StatusCode;
use warp::Filter;

use executor::ExecutionRequest;
use server::Server;

const DEFAULT_PORT: u16 = 3001;

async fn handle_execute(request: ExecutionRequest) -> Result<impl warp::Reply, Infallible> {
    match (request.code, request.language) {
        (Some(code), Some(language)) => {
            let result = executor::run(&code, &language).await;
            Ok(warp::reply::with_status(
                warp::reply::json(&result),
                StatusCode::OK,
            ))
        }
        _ => {
            let body = serde_json::json!({ "error": "Code and language are required" });
            Ok(warp::reply::with_status(
                warp::reply::json(&body),
                StatusCode::BAD_REQUEST,
            ))
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let server = Arc::new(Server::new());

    let ws_route = warp::path("ws")
        .and(warp::ws())
        .map(move |ws: warp::ws::Ws| {
            let server = server.clone();
            ws.on_upgrade(move |socket| {
                let server = server.clone();
                async move {
                    server.handle_connection(socket).await;
                }
            })
        });

    let execute_route = warp::path("execute")
        .and(warp::post())
        .and(warp::body::content_length_limit(1024 * 1024))
        .and(warp::body::json())
        .and_then(handle_execute);

    let routes = ws_route.or(execute_route).with(
        warp::cors()
            .allow_any_origin()
            .allow_header("content-type")
            .allow_methods(vec!["GET", "POST"]),
    );

    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT);

    info!("server listening on port {port}");
    warp::serve(routes).run(([0, 0, 0, 0], port)).await;
}
