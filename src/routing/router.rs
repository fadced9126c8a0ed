//! Route policy lookup.
//!
//! # Responsibilities
//! - Store compiled routes, each with its own stage pipeline
//! - Look up the route for a request
//! - Fall back to the default policy when nothing matches
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) scan in priority order (acceptable for typical route counts)
//! - Equal priorities keep configuration order

use axum::http::request::Parts;

use crate::config::{GatewayConfig, PolicyConfig, RouteConfig};
use crate::pipeline::{Pipeline, StageDeps};
use crate::routing::matcher::{AndMatcher, HostMatcher, Matcher, MethodMatcher, PathPrefixMatcher};

/// A route with its matcher and compiled pipeline.
#[derive(Debug)]
pub struct CompiledRoute {
    pub name: String,
    pub priority: u32,
    pub policy: PolicyConfig,
    pub pipeline: Pipeline,
    matcher: AndMatcher,
}

impl CompiledRoute {
    fn compile(config: &RouteConfig, deps: &StageDeps) -> Self {
        let mut matchers: Vec<Box<dyn Matcher>> =
            vec![Box::new(PathPrefixMatcher::new(config.path_prefix.clone()))];
        if let Some(host) = &config.host {
            matchers.push(Box::new(HostMatcher::new(host.clone())));
        }
        if !config.methods.is_empty() {
            matchers.push(Box::new(MethodMatcher::new(&config.methods)));
        }

        Self {
            name: config.name.clone(),
            priority: config.priority,
            policy: config.policy.clone(),
            pipeline: Pipeline::compile(&config.policy, deps),
            matcher: AndMatcher::new(matchers),
        }
    }

    pub fn matches(&self, req: &Parts) -> bool {
        self.matcher.matches(req)
    }
}

/// Ordered route table plus the fallback.
#[derive(Debug)]
pub struct PolicyRouter {
    routes: Vec<CompiledRoute>,
    fallback: CompiledRoute,
}

impl PolicyRouter {
    pub fn compile(config: &GatewayConfig, deps: &StageDeps) -> Self {
        let mut routes: Vec<CompiledRoute> = config
            .routes
            .iter()
            .map(|route| CompiledRoute::compile(route, deps))
            .collect();
        routes.sort_by(|a, b| b.priority.cmp(&a.priority));

        for route in &routes {
            tracing::debug!(
                route = %route.name,
                priority = route.priority,
                stages = ?route.pipeline.stage_names(),
                "Route compiled"
            );
        }

        let fallback = CompiledRoute {
            name: "default".to_string(),
            priority: 0,
            policy: config.default_policy.clone(),
            pipeline: Pipeline::compile(&config.default_policy, deps),
            matcher: AndMatcher::new(Vec::new()),
        };

        Self { routes, fallback }
    }

    pub fn match_route(&self, req: &Parts) -> &CompiledRoute {
        self.routes
            .iter()
            .find(|route| route.matches(req))
            .unwrap_or(&self.fallback)
    }

    pub fn routes(&self) -> &[CompiledRoute] {
        &self.routes
    }
}
