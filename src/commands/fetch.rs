use anyhow::{Context, Result};
use log::info;
use std::io::Write;
use std::path::Path;

use crate::service::Service;

use super::{parse_params, write_json};

/// Fetch one endpoint and print (or save) the decoded JSON.
#[tracing::instrument(skip(service, params, stdout), fields(service = service.name()))]
pub async fn fetch<W: Write>(
    service: &dyn Service,
    endpoint_id: &str,
    params: &[String],
    output: Option<&Path>,
    stdout: &mut W,
) -> Result<()> {
    let params = parse_params(params)?;
    info!("Fetching {} from {}", endpoint_id, service.name());

    let value = service
        .fetch(endpoint_id, params)
        .await
        .with_context(|| format!("Failed to fetch {} from {}", endpoint_id, service.name()))?;

    write_json(&value, output, stdout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{ApiError, Params};
    use crate::service::MockService;
    use mockall::predicate::*;
    use reqwest::StatusCode;
    use serde_json::json;

    fn mock_service() -> MockService {
        let mut service = MockService::new();
        service.expect_name().return_const("carbon");
        service
    }

    #[tokio::test]
    async fn test_fetch_prints_json() {
        let mut service = mock_service();
        service
            .expect_fetch()
            .with(
                eq("intensity-date"),
                eq(Params::new().set("date", "2023-10-01")),
            )
            .times(1)
            .returning(|_, _| Ok(json!({"data": "dummy"})));

        let mut out = Vec::new();
        fetch(
            &service,
            "intensity-date",
            &["date=2023-10-01".to_string()],
            None,
            &mut out,
        )
        .await
        .unwrap();

        let printed: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(printed, json!({"data": "dummy"}));
    }

    #[tokio::test]
    async fn test_fetch_writes_file() {
        let mut service = mock_service();
        service
            .expect_fetch()
            .times(1)
            .returning(|_, _| Ok(json!([1, 2, 3])));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result.json");
        let mut out = Vec::new();
        fetch(&service, "generation", &[], Some(&path), &mut out)
            .await
            .unwrap();

        assert!(out.is_empty());
        let saved = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(&saved).unwrap(),
            json!([1, 2, 3])
        );
    }

    #[tokio::test]
    async fn test_fetch_error_has_context() {
        let mut service = mock_service();
        service.expect_fetch().times(1).returning(|_, _| {
            Err(ApiError::api(
                "HTTP 404 Error: not found",
                Some(StatusCode::NOT_FOUND),
            ))
        });

        let mut out = Vec::new();
        let err = fetch(&service, "regional", &[], None, &mut out)
            .await
            .unwrap_err();

        let chain = format!("{:#}", err);
        assert!(chain.contains("Failed to fetch regional from carbon"));
        assert!(chain.contains("HTTP 404"));
        assert!(err.downcast_ref::<ApiError>().is_some());
    }

    #[tokio::test]
    async fn test_fetch_bad_param_makes_no_call() {
        let mut service = mock_service();
        service.expect_fetch().never();

        let mut out = Vec::new();
        let result = fetch(
            &service,
            "intensity",
            &["oops".to_string()],
            None,
            &mut out,
        )
        .await;

        assert!(result.is_err());
    }
}
