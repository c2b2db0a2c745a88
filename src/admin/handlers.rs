use std::sync::{Arc, Weak};

use serde::Serialize;

use crate::app::{App, Plugin};
use crate::http::{handler_fn, HandlerError};
use crate::routing::{Endpoint, FilterPhase, RegistryError, RouteSnapshot, RouteTable, Verb};
use crate::security::{Role, RoleSet};

#[derive(Debug, Serialize)]
pub struct RouteInfo {
    pub verb: Verb,
    pub path: String,
    pub kind: &'static str,
    pub roles: Vec<Role>,
}

#[derive(Debug, Serialize)]
pub struct FilterInfo {
    pub phase: FilterPhase,
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct WebSocketInfo {
    pub path: String,
    pub roles: Vec<Role>,
}

/// Everything registered on a route table.
#[derive(Debug, Serialize)]
pub struct RouteOverview {
    pub routes: Vec<RouteInfo>,
    pub filters: Vec<FilterInfo>,
    pub websockets: Vec<WebSocketInfo>,
    pub websocket_hooks: Vec<FilterInfo>,
}

impl RouteOverview {
    pub fn from_snapshot(snapshot: &RouteSnapshot) -> Self {
        Self {
            routes: snapshot
                .routes()
                .iter()
                .map(|route| RouteInfo {
                    verb: route.verb,
                    path: route.path().to_owned(),
                    kind: match route.endpoint {
                        Endpoint::Http(_) => "http",
                        Endpoint::Sse(_) => "sse",
                    },
                    roles: sorted(route.roles.as_ref()),
                })
                .collect(),
            filters: snapshot
                .filters()
                .iter()
                .map(|filter| FilterInfo {
                    phase: filter.phase,
                    path: filter.pattern.as_str().to_owned(),
                })
                .collect(),
            websockets: snapshot
                .websockets()
                .iter()
                .map(|ws| WebSocketInfo {
                    path: ws.pattern.as_str().to_owned(),
                    roles: sorted(ws.roles.as_ref()),
                })
                .collect(),
            websocket_hooks: snapshot
                .ws_filters()
                .iter()
                .map(|hook| FilterInfo {
                    phase: hook.phase,
                    path: hook.pattern.as_str().to_owned(),
                })
                .collect(),
        }
    }
}

fn sorted(roles: Option<&RoleSet>) -> Vec<Role> {
    let mut roles: Vec<Role> = roles.into_iter().flatten().cloned().collect();
    roles.sort();
    roles
}

/// Serves a JSON [`RouteOverview`] of the application's table.
#[derive(Debug, Clone)]
pub struct RouteOverviewPlugin {
    path: String,
    roles: Option<RoleSet>,
}

impl RouteOverviewPlugin {
    pub fn new(path: impl Into<String>, roles: Option<RoleSet>) -> Self {
        Self {
            path: path.into(),
            roles,
        }
    }
}

impl Plugin for RouteOverviewPlugin {
    fn apply(&self, app: &App) -> Result<(), RegistryError> {
        // The table owns this handler; a strong reference would leak both.
        let table: Weak<RouteTable> = Arc::downgrade(app.table());

        app.routes().route(
            Verb::Get,
            &self.path,
            handler_fn(move |ctx| {
                let table = table
                    .upgrade()
                    .ok_or_else(|| HandlerError::Internal("route table is gone".into()))?;
                ctx.json(&RouteOverview::from_snapshot(&table.snapshot()))?;
                Ok(())
            }),
            self.roles.clone(),
        )?;
        Ok(())
    }
}
