use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use ethers::types::H256;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{Result, VerifyError};
use crate::schema::{RpcBlock, RpcReceipt};

const JSONRPC_VERSION: &str = "2.0";

/// Moves one JSON-RPC request to the node and returns the raw response body.
#[async_trait]
pub trait Transport {
    async fn send(&self, request: &Value) -> Result<Value>;
}

/// JSON-RPC over HTTP POST.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    url: Url,
}

impl HttpTransport {
    pub fn new(url: &str) -> Result<Self> {
        let url = Url::parse(url)
            .map_err(|e| VerifyError::Config(format!("invalid rpc url {url}: {e}")))?;
        Ok(Self {
            client: Client::new(),
            url,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &Value) -> Result<Value> {
        let response = self
            .client
            .post(self.url.clone())
            .json(request)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}

#[derive(Debug, Deserialize)]
struct ResponseError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct Response {
    jsonrpc: Option<String>,
    #[serde(default)]
    id: Value,
    #[serde(default)]
    result: Value,
    error: Option<ResponseError>,
}

/// The two calls the verifier makes, with envelope checks on every response.
#[derive(Debug)]
pub struct RpcClient<T> {
    transport: T,
    next_id: AtomicU64,
}

impl<T: Transport> RpcClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            next_id: AtomicU64::new(1),
        }
    }

    /// `eth_getBlockByNumber(n, true)`, sent with request id `n`.
    pub async fn block_by_number(&self, number: u64) -> Result<Option<RpcBlock>> {
        self.call(
            "eth_getBlockByNumber",
            json!([format!("{number:#x}"), true]),
            number,
        )
        .await
    }

    pub async fn transaction_receipt(&self, hash: H256) -> Result<Option<RpcReceipt>> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.call("eth_getTransactionReceipt", json!([hash]), id)
            .await
    }

    async fn call<R: DeserializeOwned>(
        &self,
        method: &'static str,
        params: Value,
        id: u64,
    ) -> Result<Option<R>> {
        let request = json!({
            "jsonrpc": JSONRPC_VERSION,
            "method": method,
            "params": params,
            "id": id,
        });
        trace!("-> {request}");
        let raw = self.transport.send(&request).await?;
        trace!("<- {raw}");

        let response: Response =
            serde_json::from_value(raw).map_err(|e| VerifyError::Envelope {
                method,
                detail: e.to_string(),
            })?;
        if response.jsonrpc.as_deref() != Some(JSONRPC_VERSION) {
            return Err(VerifyError::Envelope {
                method,
                detail: format!("unexpected jsonrpc version {:?}", response.jsonrpc),
            });
        }
        if !id_matches(&response.id, id) {
            return Err(VerifyError::Envelope {
                method,
                detail: format!("response id {} does not match request id {id}", response.id),
            });
        }
        if let Some(err) = response.error {
            return Err(VerifyError::Rpc {
                method,
                code: err.code,
                message: err.message,
            });
        }
        serde_json::from_value(response.result).map_err(|e| VerifyError::Envelope {
            method,
            detail: format!("undecodable result: {e}"),
        })
    }
}

/// Nodes echo the id either as a number or as a numeric string.
fn id_matches(echoed: &Value, id: u64) -> bool {
    match echoed {
        Value::Number(n) => n.as_u64() == Some(id),
        Value::String(s) => s.parse::<u64>().ok() == Some(id),
        _ => false,
    }
}
