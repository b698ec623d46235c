//! Client-side route table and the sign-in guard.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Home,
    Movies,
    TvShows,
    WebSeries,
    MovieDetails(String),
    Search,
    /// Player; the video URL and title travel in navigation state.
    Watch,
    Login,
    Profile,
    Settings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    Render(Route),
    Redirect(Route),
}

impl Route {
    /// Parses a location path. Query strings and fragments are ignored, as is a
    /// trailing slash.
    pub fn parse(location: &str) -> Option<Route> {
        let path = location
            .split(['?', '#'])
            .next()
            .unwrap_or_default();
        let path = match path.trim_end_matches('/') {
            "" => "/",
            trimmed => trimmed,
        };

        let route = match path {
            "/" => Route::Home,
            "/movies" => Route::Movies,
            "/tv-shows" => Route::TvShows,
            "/web-series" => Route::WebSeries,
            "/search" => Route::Search,
            "/watch" => Route::Watch,
            "/login" => Route::Login,
            "/profile" => Route::Profile,
            "/settings" => Route::Settings,
            other => {
                let id = other.strip_prefix("/movie/")?;
                if id.is_empty() || id.contains('/') {
                    return None;
                }
                let id = urlencoding::decode(id).ok()?.into_owned();
                Route::MovieDetails(id)
            }
        };
        Some(route)
    }

    pub fn path(&self) -> String {
        match self {
            Route::Home => "/".to_string(),
            Route::Movies => "/movies".to_string(),
            Route::TvShows => "/tv-shows".to_string(),
            Route::WebSeries => "/web-series".to_string(),
            Route::MovieDetails(id) => format!("/movie/{}", urlencoding::encode(id)),
            Route::Search => "/search".to_string(),
            Route::Watch => "/watch".to_string(),
            Route::Login => "/login".to_string(),
            Route::Profile => "/profile".to_string(),
            Route::Settings => "/settings".to_string(),
        }
    }

    pub fn requires_auth(&self) -> bool {
        matches!(self, Route::Profile | Route::Settings)
    }
}

/// Protected pages send anonymous visitors to the login page; the login page
/// sends signed-in users home.
pub fn guard(route: Route, authenticated: bool) -> Navigation {
    match route {
        r if r.requires_auth() && !authenticated => Navigation::Redirect(Route::Login),
        Route::Login if authenticated => Navigation::Redirect(Route::Home),
        r => Navigation::Render(r),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_paths() {
        assert_eq!(Route::parse("/"), Some(Route::Home));
        assert_eq!(Route::parse(""), Some(Route::Home));
        assert_eq!(Route::parse("/tv-shows/"), Some(Route::TvShows));
        assert_eq!(Route::parse("/search?q=dune"), Some(Route::Search));
        assert_eq!(
            Route::parse("/movie/tt15239678"),
            Some(Route::MovieDetails("tt15239678".to_string()))
        );
        assert_eq!(Route::parse("/movie/"), None);
        assert_eq!(Route::parse("/movie/a/b"), None);
        assert_eq!(Route::parse("/admin"), None);
    }

    #[test]
    fn movie_ids_survive_the_path() {
        let route = Route::MovieDetails("67d99db46eee1a100f8bd94c-series".to_string());
        assert_eq!(Route::parse(&route.path()), Some(route));
    }

    #[test]
    fn guard_redirects() {
        assert_eq!(
            guard(Route::Profile, false),
            Navigation::Redirect(Route::Login)
        );
        assert_eq!(
            guard(Route::Settings, false),
            Navigation::Redirect(Route::Login)
        );
        assert_eq!(
            guard(Route::Settings, true),
            Navigation::Render(Route::Settings)
        );
        assert_eq!(guard(Route::Login, true), Navigation::Redirect(Route::Home));
        assert_eq!(guard(Route::Watch, false), Navigation::Render(Route::Watch));
    }
}
