// Copyright 2023-, Edge & Node, GraphOps, and Semiotic Labs.
// SPDX-License-Identifier: Apache-2.0

use anyhow::anyhow;
use graphql_client::GraphQLQuery;
use reqwest::{header, Url};

pub type ResponseResult<T> = Result<T, anyhow::Error>;

/// Minimal GraphQL-over-HTTP client for a hosted subgraph endpoint.
#[derive(Debug, Clone)]
pub struct SubgraphClient {
    http_client: reqwest::Client,
    query_url: Url,
    query_auth_token: Option<String>,
}

impl SubgraphClient {
    pub fn new(
        http_client: reqwest::Client,
        query_url: Url,
        query_auth_token: Option<String>,
    ) -> Self {
        Self {
            http_client,
            query_url,
            query_auth_token,
        }
    }

    pub fn for_query_url(
        http_client: reqwest::Client,
        query_url: &str,
    ) -> Result<Self, anyhow::Error> {
        Ok(Self::new(http_client, Url::parse(query_url)?, None))
    }

    /// Runs a query. The outer error is a transport failure, the inner one
    /// an error reported by the subgraph itself.
    pub async fn query<T: GraphQLQuery>(
        &self,
        variables: T::Variables,
    ) -> Result<ResponseResult<T::ResponseData>, anyhow::Error> {
        let body = T::build_query(variables);
        let mut req = self
            .http_client
            .post(self.query_url.as_ref())
            .header(header::USER_AGENT, "bridge-faucet")
            .json(&body);

        if let Some(token) = self.query_auth_token.as_ref() {
            req = req.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }

        let reqwest_response = req.send().await?.error_for_status()?;
        let response: graphql_client::Response<T::ResponseData> = reqwest_response.json().await?;

        Ok(match (response.data, response.errors) {
            (Some(data), None) => Ok(data),
            (None, Some(errors)) => Err(anyhow!("{errors:?}")),
            (Some(_data), Some(err)) => Err(anyhow!("Unsupported partial results. Error: {err:?}")),
            (None, None) => {
                let body = serde_json::to_string(&body).unwrap_or_default();
                Err(anyhow!(
                    "No data or error returned for query: {body}. Endpoint: {}",
                    self.query_url.as_str()
                ))
            }
        })
    }
}

#[cfg(test)]
mod test {
    use faucet_query::{token_price, TokenPrice};
    use serde_json::json;
    use wiremock::{
        matchers::{header, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;

    fn variables() -> token_price::Variables {
        token_price::Variables {
            token_id: "0x0000000000000000000000000000000000000000".to_string(),
        }
    }

    #[tokio::test]
    async fn test_query_returns_data() {
        let mock_server = MockServer::start().await;
        mock_server
            .register(
                Mock::given(method("POST"))
                    .and(path("/subgraphs/name/uniswap/uniswap-v2"))
                    .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                        "data": {
                            "bundles": [{ "ethPrice": "1800.5" }],
                            "tokens": []
                        }
                    }))),
            )
            .await;

        let client = SubgraphClient::for_query_url(
            reqwest::Client::new(),
            &format!("{}/subgraphs/name/uniswap/uniswap-v2", mock_server.uri()),
        )
        .unwrap();

        let data = client
            .query::<TokenPrice>(variables())
            .await
            .expect("Query should succeed")
            .expect("Query result should have a value");

        assert_eq!(data.bundles.len(), 1);
        assert_eq!(data.bundles[0].eth_price, "1800.5");
        assert!(data.tokens.is_empty());
    }

    #[tokio::test]
    async fn test_query_forwards_auth_token() {
        let mock_server = MockServer::start().await;
        mock_server
            .register(
                Mock::given(method("POST"))
                    .and(header("authorization", "Bearer s3cret"))
                    .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                        "data": { "bundles": [], "tokens": [] }
                    }))),
            )
            .await;

        let client = SubgraphClient::new(
            reqwest::Client::new(),
            Url::parse(&mock_server.uri()).unwrap(),
            Some("s3cret".to_string()),
        );

        client
            .query::<TokenPrice>(variables())
            .await
            .expect("Query should succeed")
            .expect("Query result should have a value");
    }

    #[tokio::test]
    async fn test_query_surfaces_graphql_errors() {
        let mock_server = MockServer::start().await;
        mock_server
            .register(Mock::given(method("POST")).respond_with(
                ResponseTemplate::new(200).set_body_json(json!({
                    "errors": [{ "message": "indexing_error" }]
                })),
            ))
            .await;

        let client = SubgraphClient::for_query_url(reqwest::Client::new(), &mock_server.uri())
            .unwrap();

        let result = client
            .query::<TokenPrice>(variables())
            .await
            .expect("Transport should succeed");
        let err = result.unwrap_err();
        assert!(err.to_string().contains("indexing_error"));
    }

    #[tokio::test]
    async fn test_query_http_error_is_transport_error() {
        let mock_server = MockServer::start().await;
        mock_server
            .register(Mock::given(method("POST")).respond_with(ResponseTemplate::new(502)))
            .await;

        let client = SubgraphClient::for_query_url(reqwest::Client::new(), &mock_server.uri())
            .unwrap();

        assert!(client.query::<TokenPrice>(variables()).await.is_err());
    }
}
