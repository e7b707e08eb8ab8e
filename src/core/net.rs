// src/core/net.rs
// Blocking HTTP over reqwest, plus the retry / re-login policy every adapter goes through.

use std::thread;

use reqwest::Url;
use reqwest::blocking::Client;
use scraper::Html;
use tracing::{debug, info, warn};

use crate::config::consts::{REQUEST_TIMEOUT, USER_AGENT};
use crate::config::options::{Credentials, RetryPolicy};
use crate::error::{FetchError, LoginForm};

/// Where pages come from. Implemented over HTTP by `HttpFetcher`; tests serve fixtures.
pub trait PageFetcher: Send + Sync {
    /// GET `url`. A login form in place of the content is `FetchError::AuthRequired`.
    fn fetch(&self, url: &str) -> Result<String, FetchError>;

    /// POST a url-encoded form (used to answer a login form).
    fn submit_form(&self, url: &str, fields: &[(String, String)]) -> Result<String, FetchError>;
}

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .cookie_store(true)
            .build()
            .map_err(|e| FetchError::network("<client>", e))?;
        Ok(Self { client })
    }

    fn read(url: &str, resp: reqwest::blocking::Response) -> Result<String, FetchError> {
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status { url: s!(url), status: status.as_u16() });
        }
        let body = resp.text().map_err(|e| FetchError::network(url, e))?;
        if let Some(form) = detect_login_form(url, &body) {
            return Err(FetchError::AuthRequired { url: s!(url), form });
        }
        Ok(body)
    }
}

impl PageFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let resp = self.client.get(url).send().map_err(|e| FetchError::network(url, e))?;
        Self::read(url, resp)
    }

    fn submit_form(&self, url: &str, fields: &[(String, String)]) -> Result<String, FetchError> {
        let resp = self
            .client
            .post(url)
            .form(fields)
            .send()
            .map_err(|e| FetchError::network(url, e))?;
        Self::read(url, resp)
    }
}

/// A `form.form-horizontal` carrying a password input is treated as a login wall.
pub fn detect_login_form(url: &str, body: &str) -> Option<LoginForm> {
    // cheap pre-check before building a DOM for every page
    if !body.contains("password") {
        return None;
    }
    let doc = Html::parse_document(body);
    let form = doc
        .select(selector!("form.form-horizontal"))
        .find(|f| f.select(selector!("input[type=password]")).next().is_some())?;

    let action = form.value().attr("action").unwrap_or("");
    let action = Url::parse(url)
        .and_then(|base| base.join(action))
        .map(|u| u.to_string())
        .unwrap_or_else(|_| s!(url));

    let fields = form
        .select(selector!("input[name]"))
        .filter(|i| !matches!(i.value().attr("type"), Some("password") | Some("submit")))
        .filter_map(|i| {
            let name = i.value().attr("name")?;
            Some((s!(name), s!(i.value().attr("value").unwrap_or(""))))
        })
        .collect();

    Some(LoginForm { action, fields })
}

/// GET with the retry budget and one re-login.
///
/// Transient failures sleep `attempt * step` between attempts. A login wall is answered
/// once with `credentials`; a second wall (or none to answer with) becomes a
/// `FetchError::Network` so callers treat it like any other exhausted fetch.
pub fn fetch_page<F: PageFetcher + ?Sized>(
    fetcher: &F,
    url: &str,
    retry: &RetryPolicy,
    credentials: Option<&Credentials>,
) -> Result<String, FetchError> {
    let mut attempt = 0u32;
    let mut relogged = false;
    loop {
        match fetcher.fetch(url) {
            Ok(body) => return Ok(body),
            Err(FetchError::AuthRequired { form, .. }) if !relogged && credentials.is_some() => {
                relogged = true;
                if let Some(creds) = credentials {
                    info!(url, action = %form.action, "login form detected, re-authenticating");
                    login(fetcher, &form, creds)?;
                }
            }
            Err(FetchError::AuthRequired { url, .. }) => {
                warn!(%url, relogged, "still behind a login form");
                return Err(FetchError::Network { url, reason: s!("authentication required") });
            }
            Err(e) if e.is_transient() && attempt + 1 < retry.attempts.max(1) => {
                attempt += 1;
                let pause = retry.backoff(attempt);
                debug!(url, attempt, ?pause, error = %e, "retrying fetch");
                thread::sleep(pause);
            }
            Err(e) => return Err(e),
        }
    }
}

fn login<F: PageFetcher + ?Sized>(
    fetcher: &F,
    form: &LoginForm,
    creds: &Credentials,
) -> Result<(), FetchError> {
    let mut fields: Vec<(String, String)> = form
        .fields
        .iter()
        .filter(|(k, _)| k != "username" && k != "password")
        .cloned()
        .collect();
    fields.push((s!("username"), creds.username.clone()));
    fields.push((s!("password"), creds.password.clone()));

    match fetcher.submit_form(&form.action, &fields) {
        // landing back on the form is reported by the next fetch
        Ok(_) | Err(FetchError::AuthRequired { .. }) => Ok(()),
        Err(e) => Err(e),
    }
}
