//! Path-template compilation and route matching.

use regex::Regex;

use crate::http::{Method, Request};

/// A handler invoked once the middleware chain has run to completion.
pub type Handler = Box<dyn Fn(&Request, &mut crate::http::Response) + Send + Sync>;

/// One registered route: its method, the template it was compiled
/// from, the compiled matcher, the ordered parameter names, the
/// handler, and any route-scoped middlewares.
pub struct Route {
    pub method: Method,
    pub original_template: String,
    compiled_matcher: Regex,
    param_names: Vec<String>,
    pub handler: Handler,
    pub middlewares: Vec<crate::server::middleware::Middleware>,
}

impl Route {
    pub fn new(method: Method, template: &str, handler: Handler) -> Self {
        let (compiled_matcher, param_names) = compile_template(template);
        Self {
            method,
            original_template: template.to_string(),
            compiled_matcher,
            param_names,
            handler,
            middlewares: Vec::new(),
        }
    }

    /// Attaches a route-scoped middleware, run after global middlewares
    /// and before the handler.
    pub fn middleware(mut self, middleware: crate::server::middleware::Middleware) -> Self {
        self.middlewares.push(middleware);
        self
    }

    /// Matches `path` against this route's compiled template, returning
    /// the captured path parameters (in declaration order) on success.
    fn match_path(&self, path: &str) -> Option<Vec<(String, String)>> {
        let captures = self.compiled_matcher.captures(path)?;
        Some(
            self.param_names
                .iter()
                .map(|name| {
                    let value = captures.name(name).map(|m| m.as_str()).unwrap_or("");
                    (name.clone(), value.to_string())
                })
                .collect(),
        )
    }
}

/// Compiles a path template (`:name` placeholders, `*` glob, literal
/// `.` escaped) into an anchored regex with named captures, returning
/// the captures' declaration order alongside it.
fn compile_template(template: &str) -> (Regex, Vec<String>) {
    let mut pattern = String::from("^");
    let mut param_names = Vec::new();
    let mut chars = template.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            ':' => {
                let mut name = String::new();
                while let Some(&next) = chars.peek() {
                    if next == '/' {
                        break;
                    }
                    name.push(next);
                    chars.next();
                }
                pattern.push_str(&format!("(?P<{}>[^/]+)", name));
                param_names.push(name);
            }
            '*' => pattern.push_str(".*"),
            '.' => pattern.push_str("\\."),
            other => pattern.push(other),
        }
    }

    pattern.push('$');
    let compiled = Regex::new(&pattern).expect("route template compiles to a valid regex");
    (compiled, param_names)
}

/// An ordered collection of routes, matched in registration order.
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    pub fn add(&mut self, route: Route) {
        self.routes.push(route);
    }

    /// Finds the first route (by registration order) matching the
    /// given method and path, populating the request's path parameters
    /// on a hit.
    pub fn matched(&self, method: Method, path: &str) -> Option<&Route> {
        self.routes
            .iter()
            .find(|route| route.method == method && route.match_path(path).is_some())
    }

    /// Matches and fills `request.path_params` in place. A convenience
    /// wrapper over [`Router::dispatch_outcome`] for callers that don't
    /// need to distinguish a route miss from a method mismatch.
    pub fn dispatch(&self, request: &mut Request, method: Method, path: &str) -> Option<&Route> {
        match self.dispatch_outcome(request, method, path) {
            Dispatch::Matched(route) => Some(route),
            _ => None,
        }
    }

    /// Matches `(method, path)` against every route. A path matched by
    /// some route's template under a *different* method yields
    /// [`Dispatch::MethodNotAllowed`] (carrying the set of methods that
    /// would have matched) rather than a plain miss, so the caller can
    /// respond `405` with an `Allow` header instead of falling through
    /// to static files / `404`.
    pub fn dispatch_outcome(&self, request: &mut Request, method: Method, path: &str) -> Dispatch<'_> {
        let mut allowed: Vec<Method> = Vec::new();

        for route in &self.routes {
            let Some(params) = route.match_path(path) else {
                continue;
            };

            if route.method == method {
                for (name, value) in params {
                    request.path_params.insert(name, value);
                }
                return Dispatch::Matched(route);
            }

            if !allowed.contains(&route.method) {
                allowed.push(route.method);
            }
        }

        if allowed.is_empty() {
            Dispatch::NotFound
        } else {
            Dispatch::MethodNotAllowed(allowed)
        }
    }
}

/// The outcome of matching `(method, path)` against the route table.
pub enum Dispatch<'a> {
    /// A route matched; its path parameters have already been written
    /// into the request.
    Matched(&'a Route),
    /// No route of this method matched, but the path is recognized
    /// under one or more other methods.
    MethodNotAllowed(Vec<Method>),
    /// No route's template matched this path under any method.
    NotFound,
}
