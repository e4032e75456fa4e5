use std::fmt::Display;

use shared::{GameId, TournamentId};
use tracing::info;

use crate::event::Event;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Route {
    Home,
    GamesList,
    Game(GameId),
    Tournament(TournamentId),
}

impl Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Route::Home => write!(f, "#/"),
            Route::GamesList => write!(f, "#/pong"),
            Route::Game(id) => write!(f, "#/game/{id}"),
            Route::Tournament(id) => write!(f, "#/tournament/{id}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Flow {
    Stay,
    Navigate(Route),
}

/// a view with its own resources. the router tears it down before anything else is shown.
pub trait Page {
    fn handle(&mut self, event: Event) -> Flow;

    /// must be safe to call any number of times.
    fn teardown(&mut self);
}

pub struct Router {
    current: Route,
    active: Option<Box<dyn Page>>,
}

impl Router {
    pub fn new(route: Route) -> Self {
        Self {
            current: route,
            active: None,
        }
    }

    pub fn current(&self) -> &Route {
        &self.current
    }

    pub fn mount(&mut self, route: Route, page: Box<dyn Page>) {
        self.leave();
        info!(%route, "page mounted");
        self.current = route;
        self.active = Some(page);
    }

    pub fn navigate(&mut self, route: Route) {
        self.leave();
        info!(from = %self.current, to = %route, "navigating");
        self.current = route;
    }

    /// hands the event to the active page. returns the new route when the page navigated away.
    pub fn dispatch(&mut self, event: Event) -> Option<Route> {
        let page = self.active.as_mut()?;
        match page.handle(event) {
            Flow::Stay => None,
            Flow::Navigate(route) => {
                self.navigate(route.clone());
                Some(route)
            }
        }
    }

    fn leave(&mut self) {
        if let Some(mut page) = self.active.take() {
            page.teardown();
        }
    }
}

impl Drop for Router {
    fn drop(&mut self) {
        self.leave();
    }
}
