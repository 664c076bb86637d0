//! # アップストリームHTTP実行器
//!
//! アップストリーム呼び出しをトレイトで抽象化する。本番はreqwestの実装、
//! テストでは呼び出し回数や応答を差し替えるモックを使う。

use async_trait::async_trait;

use crate::error::GatewayError;

/// アップストリームへのHTTPリクエストを実行するシーム。
#[async_trait]
pub trait HttpExecutor: Send + Sync {
    /// リクエストを1回実行し、ステータスコードと本文を返す。
    ///
    /// bodyが`Some`ならJSONとして送信する。接続失敗・タイムアウトは
    /// それぞれ専用のエラー種別に分類する。
    async fn send(
        &self,
        method: &str,
        url: &str,
        body: Option<String>,
        headers: &[(String, String)],
    ) -> Result<(u16, String), GatewayError>;
}

/// reqwestによる本番実装。
pub struct ReqwestExecutor {
    client: reqwest::Client,
}

impl ReqwestExecutor {
    pub fn new(timeout: std::time::Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpExecutor for ReqwestExecutor {
    async fn send(
        &self,
        method: &str,
        url: &str,
        body: Option<String>,
        headers: &[(String, String)],
    ) -> Result<(u16, String), GatewayError> {
        let method = reqwest::Method::from_bytes(method.as_bytes())
            .map_err(|_| GatewayError::Internal(format!("不正なHTTPメソッド: {method}")))?;

        let mut request = self.client.request(method, url);
        for (name, value) in headers {
            request = request.header(name, value);
        }
        if let Some(body) = body {
            // Content-Typeは呼び出し元の指定を優先する。headerは上書きではなく
            // 追加なので、無条件に付けると二重送信になる
            let has_content_type = headers
                .iter()
                .any(|(name, _)| name.eq_ignore_ascii_case("content-type"));
            if !has_content_type {
                request = request.header(reqwest::header::CONTENT_TYPE, "application/json");
            }
            request = request.body(body);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::UpstreamTimeout(url.to_string())
            } else {
                GatewayError::UpstreamUnavailable(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::UpstreamTimeout(url.to_string())
            } else {
                GatewayError::UpstreamUnavailable(e.to_string())
            }
        })?;
        Ok((status, text))
    }
}


#[cfg(test)]
mod tests {
    use super::testing::CannedExecutor;
    use super::*;

    /// モック実行器が応答をキュー順に返し、呼び出しを記録することを確認
    #[tokio::test]
    async fn test_canned_executor_order() {
        let executor = CannedExecutor::new(vec![
            Ok((200, "first".to_string())),
            Ok((404, "second".to_string())),
        ]);
        let (status, body) = executor
            .send("POST", "http://upstream/a", None, &[])
            .await
            .unwrap();
        assert_eq!((status, body.as_str()), (200, "first"));
        let (status, body) = executor
            .send("GET", "http://upstream/b", None, &[])
            .await
            .unwrap();
        assert_eq!((status, body.as_str()), (404, "second"));
        assert_eq!(executor.call_count(), 2);
    }

    /// Content-Typeが二重送信されないことを確認。
    /// 呼び出し元指定があればそれだけが届き、なければJSONとして送る。
    #[tokio::test]
    async fn test_content_type_not_duplicated() {
        let mock = axum::Router::new().route(
            "/echo",
            axum::routing::post(|headers: axum::http::HeaderMap| async move {
                let values: Vec<String> = headers
                    .get_all(axum::http::header::CONTENT_TYPE)
                    .iter()
                    .filter_map(|v| v.to_str().ok().map(str::to_string))
                    .collect();
                values.join(",")
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, mock).await.unwrap();
        });
        let url = format!("http://{addr}/echo");

        let executor = ReqwestExecutor::new(std::time::Duration::from_secs(5)).unwrap();

        let caller_header = vec![("Content-Type".to_string(), "text/plain".to_string())];
        let (status, body) = executor
            .send("POST", &url, Some("plain".to_string()), &caller_header)
            .await
            .unwrap();
        assert_eq!(status, 200);
        assert_eq!(body, "text/plain");

        let (_, body) = executor
            .send("POST", &url, Some("{}".to_string()), &[])
            .await
            .unwrap();
        assert_eq!(body, "application/json");
    }

    /// 接続不能なアドレスへの送信がUpstreamUnavailableになることを確認
    #[tokio::test]
    async fn test_reqwest_executor_connect_error() {
        let executor = ReqwestExecutor::new(std::time::Duration::from_secs(2)).unwrap();
        let result = executor
            .send("GET", "http://127.0.0.1:1/never", None, &[])
            .await;
        assert!(matches!(result, Err(GatewayError::UpstreamUnavailable(_))));
    }
}
