//! 内存传输实现
//!
//! 按 (方法, 路径) 预置应答队列并记录全部调用，供上层测试断言调用顺序和次数。
//! 队列中只剩一个应答时该应答会被重复使用；未预置的路径返回 404。

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::{Method, Request, Response, Result, Transport, TransportError};

/// 已记录的调用
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub method: Method,
    pub path: String,
    pub body: Option<String>,
}

impl RecordedCall {
    pub fn is_mutating(&self) -> bool {
        self.method != Method::GET && self.method != Method::HEAD
    }
}

type Reply = Result<Response>;

#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<HashMap<(Method, String), VecDeque<Reply>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为路径追加一个应答
    pub fn on(&self, method: Method, path: &str, reply: Reply) {
        let mut routes = self.routes.lock().unwrap_or_else(|e| e.into_inner());
        routes
            .entry((method, path.to_string()))
            .or_default()
            .push_back(reply);
    }

    /// 追加 JSON 应答
    pub fn respond(&self, method: Method, path: &str, status: u16, body: serde_json::Value) {
        self.on(method, path, Ok(Response::new(status, body.to_string())));
    }

    /// 追加空响应体应答
    pub fn respond_empty(&self, method: Method, path: &str, status: u16) {
        self.on(method, path, Ok(Response::new(status, "")));
    }

    /// 追加传输错误
    pub fn fail(&self, method: Method, path: &str, error: TransportError) {
        self.on(method, path, Err(error));
    }

    /// 清空某路径的应答队列
    pub fn clear(&self, method: Method, path: &str) {
        let mut routes = self.routes.lock().unwrap_or_else(|e| e.into_inner());
        routes.remove(&(method, path.to_string()));
    }

    /// 全部调用（按发生顺序）
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// 会修改远端状态的调用
    pub fn mutating_calls(&self) -> Vec<RecordedCall> {
        self.calls().into_iter().filter(RecordedCall::is_mutating).collect()
    }

    /// 某个 (方法, 路径) 的调用次数
    pub fn calls_to(&self, method: Method, path: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.method == method && c.path == path)
            .count()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: Request) -> Result<Response> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(RecordedCall {
                method: request.method.clone(),
                path: request.path.clone(),
                body: request.body.clone(),
            });

        let mut routes = self.routes.lock().unwrap_or_else(|e| e.into_inner());
        let queue = match routes.get_mut(&(request.method, request.path.clone())) {
            Some(queue) => queue,
            None => {
                return Ok(Response::new(
                    404,
                    format!(r#"{{"message":"not found: {}","majorErrorCode":404}}"#, request.path),
                ))
            }
        };

        let reply = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        reply.unwrap_or_else(|| Ok(Response::new(404, "")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replies_in_order_last_sticky() {
        let mock = MockTransport::new();
        mock.respond(Method::GET, "/a", 200, serde_json::json!({"n": 1}));
        mock.respond(Method::GET, "/a", 200, serde_json::json!({"n": 2}));

        let r1 = mock.send(Request::get("/a")).await.unwrap();
        let r2 = mock.send(Request::get("/a")).await.unwrap();
        let r3 = mock.send(Request::get("/a")).await.unwrap();
        assert!(r1.body.contains("1"));
        assert!(r2.body.contains("2"));
        assert!(r3.body.contains("2"));
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let mock = MockTransport::new();
        let response = mock.send(Request::new(Method::DELETE, "/missing")).await.unwrap();
        assert!(response.is_not_found());
        assert_eq!(mock.mutating_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_failure_reply() {
        let mock = MockTransport::new();
        mock.fail(Method::GET, "/t", TransportError::Timeout("slow".into()));
        let err = mock.send(Request::get("/t")).await.unwrap_err();
        assert_eq!(err, TransportError::Timeout("slow".into()));
        assert_eq!(mock.calls_to(Method::GET, "/t"), 1);
    }
}
