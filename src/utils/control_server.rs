use anyhow::{Context, Result};
use log::info;
use std::collections::HashMap;
use std::net::SocketAddr;
use warp::filters::BoxedFilter;
use warp::http::StatusCode;
use warp::Filter;

use crate::commands::{failure, Command, ControlHandle};
use crate::models::farming::{FarmingConfigPatch, GameRef};
use crate::models::settings::SettingsPatch;

type Route = BoxedFilter<(Box<dyn warp::Reply>,)>;

/// Bind the local control API and serve it in the background.
pub fn start_control_server(addr: &str, handle: ControlHandle) -> Result<SocketAddr> {
    let addr: SocketAddr = addr
        .parse()
        .with_context(|| format!("invalid control address {}", addr))?;

    // Define filter outside spawn to avoid lifetime issues in warp 0.4
    let api = routes(handle);
    tokio::spawn(warp::serve(api).run(addr));

    info!("🌐 Control API listening on http://{}", addr);
    Ok(addr)
}

fn with_handle(
    handle: ControlHandle,
) -> impl Filter<Extract = (ControlHandle,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || handle.clone())
}

async fn respond(
    handle: ControlHandle,
    command: Command,
) -> Result<Box<dyn warp::Reply>, warp::Rejection> {
    match handle.send(command).await {
        Some(value) => Ok(Box::new(warp::reply::json(&value))),
        None => Ok(Box::new(warp::reply::with_status(
            warp::reply::json(&failure("scheduler is not running")),
            StatusCode::SERVICE_UNAVAILABLE,
        ))),
    }
}

/// Routes without a request body.
fn simple(method: BoxedFilter<()>, path: BoxedFilter<()>, handle: &ControlHandle, command: Command) -> Route {
    method
        .and(path)
        .and(warp::path::end())
        .and(with_handle(handle.clone()))
        .and_then(move |handle| respond(handle, command.clone()))
        .boxed()
}

pub fn routes(handle: ControlHandle) -> Route {
    let get = || warp::get().boxed();
    let post = || warp::post().boxed();
    let delete = || warp::delete().boxed();

    let farm_start = warp::post()
        .and(warp::path!("api" / "farm" / "start"))
        .and(warp::body::json::<GameRef>())
        .and(with_handle(handle.clone()))
        .and_then(|game, handle| respond(handle, Command::StartFarm(game)))
        .boxed();

    let cancel_queued = warp::delete()
        .and(warp::path!("api" / "farm" / "queue" / String))
        .and(with_handle(handle.clone()))
        .and_then(|drop_id, handle| respond(handle, Command::CancelQueued(drop_id)))
        .boxed();

    let set_config = warp::post()
        .and(warp::path!("api" / "farm" / "config"))
        .and(warp::body::json::<FarmingConfigPatch>())
        .and(with_handle(handle.clone()))
        .and_then(|patch, handle| respond(handle, Command::SetFarmingConfig(patch)))
        .boxed();

    let capture_headers = warp::post()
        .and(warp::path!("api" / "headers"))
        .and(warp::body::json::<HashMap<String, String>>())
        .and(with_handle(handle.clone()))
        .and_then(|headers, handle| respond(handle, Command::CaptureHeaders(headers)))
        .boxed();

    let search = warp::get()
        .and(warp::path!("api" / "games" / "search"))
        .and(warp::query::<HashMap<String, String>>())
        .and(with_handle(handle.clone()))
        .and_then(|query: HashMap<String, String>, handle| {
            let q = query.get("q").cloned().unwrap_or_default();
            respond(handle, Command::SearchGames(q))
        })
        .boxed();

    let update_settings = warp::post()
        .and(warp::path!("api" / "settings"))
        .and(warp::body::json::<SettingsPatch>())
        .and(with_handle(handle.clone()))
        .and_then(|patch, handle| respond(handle, Command::UpdateSettings(patch)))
        .boxed();

    let h = &handle;
    let farm_stop = simple(post(), warp::path!("api" / "farm" / "stop").boxed(), h, Command::StopFarm);
    let farm_status = simple(get(), warp::path!("api" / "farm" / "status").boxed(), h, Command::FarmStatus);
    let queue_status = simple(get(), warp::path!("api" / "farm" / "queue").boxed(), h, Command::QueueStatus);
    let get_config = simple(get(), warp::path!("api" / "farm" / "config").boxed(), h, Command::GetFarmingConfig);
    let check_now = simple(post(), warp::path!("api" / "check").boxed(), h, Command::CheckNow);
    let headers_status = simple(get(), warp::path!("api" / "headers").boxed(), h, Command::HeadersStatus);
    let refresh = simple(post(), warp::path!("api" / "token" / "refresh").boxed(), h, Command::RefreshToken);
    let auth_status = simple(get(), warp::path!("api" / "status").boxed(), h, Command::AuthStatus);
    let get_settings = simple(get(), warp::path!("api" / "settings").boxed(), h, Command::GetSettings);
    let get_history = simple(get(), warp::path!("api" / "history").boxed(), h, Command::GetHistory);
    let clear_history = simple(delete(), warp::path!("api" / "history").boxed(), h, Command::ClearHistory);
    let test_telegram = simple(post(), warp::path!("api" / "telegram" / "test").boxed(), h, Command::TestTelegram);
    let notifications = simple(get(), warp::path!("api" / "notifications").boxed(), h, Command::Notifications);

    farm_start
        .or(farm_stop)
        .unify()
        .or(farm_status)
        .unify()
        .or(queue_status)
        .unify()
        .or(cancel_queued)
        .unify()
        .or(get_config)
        .unify()
        .or(set_config)
        .unify()
        .or(check_now)
        .unify()
        .or(headers_status)
        .unify()
        .or(capture_headers)
        .unify()
        .or(refresh)
        .unify()
        .or(auth_status)
        .unify()
        .or(search)
        .unify()
        .or(get_settings)
        .unify()
        .or(update_settings)
        .unify()
        .or(get_history)
        .unify()
        .or(clear_history)
        .unify()
        .or(test_telegram)
        .unify()
        .or(notifications)
        .unify()
        .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use warp::Reply;

    /// Stands in for the scheduler: answers every command with its name.
    fn echo_handle() -> ControlHandle {
        let (handle, mut rx) = ControlHandle::channel();
        tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                let name = format!("{:?}", request.command);
                request.reply.send(json!({ "command": name })).ok();
            }
        });
        handle
    }

    #[tokio::test]
    async fn test_reply_from_scheduler() {
        let handle = echo_handle();
        assert_eq!(
            handle.send(Command::CancelQueued("drop-1".into())).await,
            Some(json!({ "command": "CancelQueued(\"drop-1\")" }))
        );

        let response = respond(handle, Command::FarmStatus)
            .await
            .unwrap()
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unavailable_when_scheduler_gone() {
        let (handle, rx) = ControlHandle::channel();
        drop(rx);
        assert_eq!(handle.send(Command::CheckNow).await, None);

        let response = respond(handle, Command::CheckNow)
            .await
            .unwrap()
            .into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_rejects_bad_address() {
        let (handle, _rx) = ControlHandle::channel();
        assert!(start_control_server("not an address", handle).is_err());
    }
}
