// ABOUTME: Fetches the next wake-up time from the schedule service over HTTP.
// ABOUTME: Tries the local endpoint first, then the production host; failures never escape the poll cycle.

use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::Deserialize;

use crate::config::ScheduleConfig;

/// The wake time as last reported by the schedule service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WakeSchedule {
    pub time_of_day: NaiveTime,
    pub enabled: bool,
}

impl WakeSchedule {
    pub fn disabled() -> Self {
        Self {
            time_of_day: NaiveTime::MIN,
            enabled: false,
        }
    }

    /// The wake instant on `date`.
    pub fn on(&self, date: NaiveDate) -> NaiveDateTime {
        date.and_time(self.time_of_day)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("no schedule host configured")]
    NoHosts,
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("{url} sent an unreadable body: {source}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} sent an invalid wake time {time:?}")]
    InvalidTime { url: String, time: String },
    #[error("all schedule hosts failed, last error: {0}")]
    AllHostsFailed(Box<FetchError>),
}

/// Wire format of the status endpoint.
#[derive(Deserialize)]
struct StatusResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<StatusData>,
}

#[derive(Deserialize)]
struct StatusData {
    #[serde(default)]
    enabled: bool,
    #[serde(default)]
    time: Option<String>,
}

pub struct ScheduleClient {
    client: reqwest::Client,
    urls: Vec<String>,
}

impl ScheduleClient {
    pub fn new(config: &ScheduleConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(FetchError::Client)?;

        let urls = [&config.local_url, &config.production_url]
            .into_iter()
            .filter(|base| !base.is_empty())
            .map(|base| format!("{}{}", base.trim_end_matches('/'), config.status_path))
            .collect();

        Ok(Self { client, urls })
    }

    /// Fetch the current schedule, falling through the configured hosts in order.
    pub async fn fetch(&self) -> Result<WakeSchedule, FetchError> {
        let mut last_error = None;
        for url in &self.urls {
            match self.fetch_from(url).await {
                Ok(schedule) => return Ok(schedule),
                Err(e) => {
                    tracing::debug!("Schedule host unavailable: {e}");
                    last_error = Some(e);
                }
            }
        }
        Err(match last_error {
            Some(e) => FetchError::AllHostsFailed(Box::new(e)),
            None => FetchError::NoHosts,
        })
    }

    async fn fetch_from(&self, url: &str) -> Result<WakeSchedule, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| FetchError::Request {
                url: url.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status(),
            });
        }

        let parsed: StatusResponse = response.json().await.map_err(|source| FetchError::Body {
            url: url.to_string(),
            source,
        })?;
        interpret(url, parsed)
    }
}

/// `success: false` is how the service says no alarm is set.
fn interpret(url: &str, response: StatusResponse) -> Result<WakeSchedule, FetchError> {
    let data = match response.data {
        Some(data) if response.success => data,
        _ => return Ok(WakeSchedule::disabled()),
    };
    if !data.enabled {
        return Ok(WakeSchedule::disabled());
    }

    let time = data.time.unwrap_or_default();
    match parse_time_of_day(&time) {
        Some(time_of_day) => Ok(WakeSchedule {
            time_of_day,
            enabled: true,
        }),
        None => Err(FetchError::InvalidTime {
            url: url.to_string(),
            time,
        }),
    }
}

/// Accepts "HH:MM" or "HH:MM:SS"; seconds are dropped so the wake time lands on the minute.
fn parse_time_of_day(text: &str) -> Option<NaiveTime> {
    let text = text.trim();
    let parsed = NaiveTime::parse_from_str(text, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(text, "%H:%M"))
        .ok()?;
    NaiveTime::from_hms_opt(parsed.hour(), parsed.minute(), 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATUS_PATH: &str = "/api/scheduler/wake-up/status";
    const REFUSED: &str = "http://127.0.0.1:9";

    fn client_for(local_url: &str, production_url: &str) -> ScheduleClient {
        ScheduleClient::new(&ScheduleConfig {
            local_url: local_url.to_string(),
            production_url: production_url.to_string(),
            status_path: STATUS_PATH.to_string(),
            connect_timeout_ms: 500,
            request_timeout_ms: 1000,
        })
        .unwrap()
    }

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn parse_time_of_day_accepts_both_formats() {
        assert_eq!(parse_time_of_day("06:30"), Some(hm(6, 30)));
        assert_eq!(parse_time_of_day("06:30:45"), Some(hm(6, 30)));
        assert_eq!(parse_time_of_day("25:00"), None);
        assert_eq!(parse_time_of_day(""), None);
    }

    #[test]
    fn interpret_unsuccessful_response_as_disabled() {
        let response: StatusResponse =
            serde_json::from_str(r#"{"success": false, "message": "No alarm time set"}"#).unwrap();
        assert_eq!(interpret("u", response).unwrap(), WakeSchedule::disabled());
    }

    #[test]
    fn interpret_enabled_without_time_is_an_error() {
        let response: StatusResponse =
            serde_json::from_str(r#"{"success": true, "data": {"enabled": true}}"#).unwrap();
        assert!(matches!(interpret("u", response), Err(FetchError::InvalidTime { .. })));
    }

    #[test]
    fn wake_instant_is_on_the_given_date() {
        let schedule = WakeSchedule {
            time_of_day: hm(6, 30),
            enabled: true,
        };
        let date = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        assert_eq!(schedule.on(date).to_string(), "2025-03-10 06:30:00");
    }

    #[tokio::test]
    async fn fetch_reads_enabled_schedule_from_local_host() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", STATUS_PATH)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"success": true, "data": {"enabled": true, "time": "06:30:00"}}"#)
            .create_async()
            .await;

        let schedule = client_for(&server.url(), "").fetch().await.unwrap();
        assert_eq!(schedule.time_of_day, hm(6, 30));
        assert!(schedule.enabled);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn fetch_falls_back_to_production_when_local_refuses() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", STATUS_PATH)
            .with_status(200)
            .with_body(r#"{"success": true, "data": {"enabled": true, "time": "07:15"}}"#)
            .create_async()
            .await;

        let schedule = client_for(REFUSED, &server.url()).fetch().await.unwrap();
        assert_eq!(schedule.time_of_day, hm(7, 15));
    }

    #[tokio::test]
    async fn fetch_falls_back_when_local_answers_with_error_status() {
        let mut local = mockito::Server::new_async().await;
        local
            .mock("GET", STATUS_PATH)
            .with_status(500)
            .create_async()
            .await;
        let mut production = mockito::Server::new_async().await;
        production
            .mock("GET", STATUS_PATH)
            .with_status(200)
            .with_body(r#"{"success": true, "data": {"enabled": false}}"#)
            .create_async()
            .await;

        let schedule = client_for(&local.url(), &production.url()).fetch().await.unwrap();
        assert!(!schedule.enabled);
    }

    #[tokio::test]
    async fn fetch_reports_failure_when_every_host_fails() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", STATUS_PATH)
            .with_status(200)
            .with_body("<html>maintenance</html>")
            .create_async()
            .await;

        let err = client_for(REFUSED, &server.url()).fetch().await.unwrap_err();
        match err {
            FetchError::AllHostsFailed(last) => assert!(matches!(*last, FetchError::Body { .. })),
            other => panic!("Expected AllHostsFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn fetch_without_hosts_is_an_error() {
        let err = client_for("", "").fetch().await.unwrap_err();
        assert!(matches!(err, FetchError::NoHosts));
    }
}
