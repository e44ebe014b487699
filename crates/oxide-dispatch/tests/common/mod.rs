#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use oxide_dispatch::{handler, HandleProps, HandleResponse, Handler, Response};

/// Names of handlers in the order they ran.
pub type Calls = Arc<Mutex<Vec<&'static str>>>;

pub fn calls() -> Calls {
    Arc::default()
}

pub fn seen(calls: &Calls) -> Vec<&'static str> {
    calls.lock().unwrap().clone()
}

/// A handler that records its name and changes nothing.
pub fn noop(calls: &Calls, name: &'static str) -> Handler<()> {
    let calls = Arc::clone(calls);
    handler(move |_props: HandleProps<()>| {
        let calls = Arc::clone(&calls);
        async move {
            calls.lock().unwrap().push(name);
            Ok(HandleResponse::Unchanged)
        }
    })
}

/// A handler that responds with 200 and a text body.
pub fn text(body: &'static str) -> Handler<()> {
    handler(move |_props: HandleProps<()>| async move { Ok(Response::text(body).into()) })
}

/// A handler that adds a header to the current (or a new) response.
pub fn add_response_header(
    calls: &Calls,
    name: &'static str,
    key: &'static str,
    value: &'static str,
) -> Handler<()> {
    let calls = Arc::clone(calls);
    handler(move |props: HandleProps<()>| {
        let calls = Arc::clone(&calls);
        async move {
            calls.lock().unwrap().push(name);
            let response = props.response.unwrap_or_else(Response::ok);
            Ok(response.header(key, value).into())
        }
    })
}
