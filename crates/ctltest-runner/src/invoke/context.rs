//! Context construction, following the framework's dispatch path

use serde_json::{Map, Value};
use tracing::{debug, warn};

use ctltest_core::form::parse_body;
use ctltest_core::{Config, Context, Input, Request, ResponseRecorder, RoutePattern, SPLAT, StatusCode};

/// A request the dispatcher refused before reaching the controller.
#[derive(Debug)]
pub(super) struct Rejected {
    pub(super) method: String,
    pub(super) response: ResponseRecorder,
}

/// Build the context a controller is initialized with.
///
/// `params` are injected as path parameters last, so they win over values
/// taken from the route.
pub(super) fn build(
    request: Request,
    config: &Config,
    params: &Map<String, Value>,
) -> Result<Context, Rejected> {
    let mut ctx = Context::new(request);

    if !ctx.input.request().is_known_method() {
        ctx.output
            .error("Method Not Allowed", StatusCode::METHOD_NOT_ALLOWED);
        return Err(Rejected {
            method: ctx.input.method().to_string(),
            response: ctx.output,
        });
    }

    let route_path = if config.router_case_sensitive {
        ctx.input.path().to_string()
    } else {
        ctx.input.path().to_lowercase()
    };
    ctx.input.set_route_path(route_path);

    if let Some(pattern) = config.route.as_deref() {
        match_route(&mut ctx.input, pattern, config.router_case_sensitive);
    }

    seed_query(&mut ctx.input);
    if !matches!(ctx.input.method(), "GET" | "HEAD") {
        read_body(&mut ctx.input, config);
    }

    fan_out_splat(&mut ctx.input);

    for (name, value) in params {
        ctx.input.set_param(name, param_text(value));
    }

    Ok(ctx)
}

/// Text form of an injected parameter: strings verbatim, anything else as JSON.
pub(super) fn param_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn match_route(input: &mut Input, pattern: &str, case_sensitive: bool) {
    let pattern = if case_sensitive {
        pattern.to_string()
    } else {
        pattern.to_lowercase()
    };
    let route = match RoutePattern::parse(&pattern) {
        Ok(route) => route,
        Err(e) => {
            warn!(error = %e, "ignoring invalid route pattern");
            return;
        }
    };

    match route.matches(input.route_path()) {
        Some(captured) => {
            for (name, value) in captured {
                input.set_param(&name, value);
            }
        }
        None => debug!(%route, path = input.route_path(), "route does not match request path"),
    }
}

fn seed_query(input: &mut Input) {
    let pairs: Vec<_> = input.request().query_pairs().collect();
    for (key, value) in pairs {
        input.form_mut().add(key, value);
    }
}

fn read_body(input: &mut Input, config: &Config) {
    let max_bytes = config.max_memory_bytes();
    if config.copy_request_body && !input.is_upload() {
        input.copy_body(max_bytes);
    }

    let Some(content_type) = input.request().content_type().map(str::to_owned) else {
        return;
    };
    match parse_body(&content_type, input.request().body(), max_bytes) {
        Ok(parsed) => {
            for (key, value) in parsed.fields {
                input.form_mut().add(key, value);
            }
            for file in parsed.files {
                input.add_file(file);
            }
        }
        Err(e) => warn!(error = %e, content_type = %content_type, "cannot parse request body"),
    }
}

fn fan_out_splat(input: &mut Input) {
    let Some(splat) = input
        .param(SPLAT)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
    else {
        return;
    };
    for (idx, segment) in splat.split('/').enumerate() {
        input.set_param(&idx.to_string(), segment);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    fn built(request: Request, config: &Config) -> Context {
        build(request, config, &Map::new()).unwrap()
    }

    #[test]
    fn unknown_method_is_rejected_with_405() {
        let request = Request::new("PURGE", "/items").unwrap();
        let rejected = build(request, &Config::default(), &Map::new()).unwrap_err();
        assert_eq!(rejected.method, "PURGE");
        assert_eq!(rejected.response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(rejected.response.text(), "Method Not Allowed\n");
    }

    #[test]
    fn route_path_lowercased_only_when_case_insensitive() {
        let request = Request::get("/Users/Bob").unwrap();
        let ctx = built(request.clone(), &Config::default());
        assert_eq!(ctx.input.route_path(), "/Users/Bob");

        let ctx = built(request, &Config::default().with_case_sensitive(false));
        assert_eq!(ctx.input.route_path(), "/users/bob");
        assert_eq!(ctx.input.path(), "/Users/Bob");
    }

    #[test]
    fn route_params_and_splat_fan_out() {
        let config = Config::default().with_route("/files/:bucket/*");
        let ctx = built(Request::get("/files/docs/a/b.txt").unwrap(), &config);
        assert_eq!(ctx.input.param("bucket"), Some("docs"));
        assert_eq!(ctx.input.param(SPLAT), Some("a/b.txt"));
        assert_eq!(ctx.input.param("0"), Some("a"));
        assert_eq!(ctx.input.param("1"), Some("b.txt"));
        assert_eq!(ctx.input.param("2"), None);
    }

    #[test]
    fn unmatched_or_invalid_route_adds_nothing() {
        let config = Config::default().with_route("/files/*");
        let ctx = built(Request::get("/other").unwrap(), &config);
        assert!(ctx.input.params().is_empty());

        let config = Config::default().with_route("/a/*/b");
        let ctx = built(Request::get("/a/x/b").unwrap(), &config);
        assert!(ctx.input.params().is_empty());
    }

    #[test]
    fn injected_params_override_route_values() {
        let config = Config::default().with_route("/users/:id");
        let injected = params(json!({"id": 42, "name": "bob", "admin": true}));
        let ctx = build(Request::get("/users/7").unwrap(), &config, &injected).unwrap();
        assert_eq!(ctx.input.param("id"), Some("42"));
        assert_eq!(ctx.input.param("name"), Some("bob"));
        assert_eq!(ctx.input.param("admin"), Some("true"));
    }

    #[test]
    fn query_seeds_form_for_every_method() {
        let ctx = built(Request::get("/search?q=rust&page=2").unwrap(), &Config::default());
        assert_eq!(ctx.input.form().get("q"), Some("rust"));
        assert_eq!(ctx.input.form().get("page"), Some("2"));
    }

    #[test]
    fn post_body_is_copied_and_parsed() {
        let request = Request::post("/login?next=home")
            .unwrap()
            .with_form([("user", "alice"), ("pass", "s3cret")]);
        let ctx = built(request, &Config::default());
        assert_eq!(ctx.input.form().get("user"), Some("alice"));
        assert_eq!(ctx.input.form().get("next"), Some("home"));
        assert_eq!(ctx.input.body(), b"pass=s3cret&user=alice");
    }

    #[test]
    fn body_capture_can_be_disabled() {
        let request = Request::post("/").unwrap().with_form([("a", "1")]);
        let ctx = built(request, &Config::default().with_copy_request_body(false));
        assert!(ctx.input.body().is_empty());
        assert_eq!(ctx.input.form().get("a"), Some("1"));
    }

    #[test]
    fn get_body_is_ignored() {
        let request = Request::get("/").unwrap().with_form([("a", "1")]);
        let ctx = built(request, &Config::default());
        assert!(ctx.input.body().is_empty());
        assert!(ctx.input.form().is_empty());
    }

    #[test]
    fn body_capture_respects_max_memory() {
        let request = Request::post("/").unwrap().with_body("0123456789");
        let ctx = built(request, &Config::default().with_max_memory(4));
        assert_eq!(ctx.input.body(), b"0123");
    }

    #[test]
    fn malformed_multipart_is_not_fatal() {
        let request = Request::post("/upload")
            .unwrap()
            .with_header("Content-Type", "multipart/form-data")
            .unwrap()
            .with_body("garbage");
        let ctx = built(request, &Config::default());
        assert!(ctx.input.files().is_empty());
        assert!(ctx.input.body().is_empty());
    }

    #[test]
    fn param_text_renders_json_scalars() {
        assert_eq!(param_text(&json!("x")), "x");
        assert_eq!(param_text(&json!(1.5)), "1.5");
        assert_eq!(param_text(&json!(null)), "null");
        assert_eq!(param_text(&json!([1, 2])), "[1,2]");
    }
}
