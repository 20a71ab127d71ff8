use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

use crate::bean::SharedBean;
use crate::charset::Charset;
use crate::el::{ExpressionEvaluator, ScopedEvaluator};
use crate::error::RenderError;
use crate::scope::{MemoryStore, Session};

/// Request attribute names shared between the context and error pages.
pub mod attrs {
    pub const JSP_EXCEPTION: &str = "tessera.page.exception";
    pub const ERROR_EXCEPTION: &str = "tessera.error.exception";
    pub const ERROR_STATUS_CODE: &str = "tessera.error.status_code";
    pub const ERROR_REQUEST_URI: &str = "tessera.error.request_uri";
    pub const ERROR_UNIT_NAME: &str = "tessera.error.unit_name";
    pub const ERROR_HANDLED: &str = "tessera.error.handled";
    pub const INCLUDE_PATH: &str = "tessera.include.path";
    pub const FORWARD_SEEN: &str = "tessera.forward.seen";
    pub const FIRST_REQUEST_SEEN: &str = "tessera.first_request_seen";
    /// Page-scope name under which a tag definition exposes its body fragment.
    pub const TAG_BODY: &str = "tessera.tag.body";
}

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

pub struct Request {
    uri: String,
    method: String,
    parameters: IndexMap<String, Vec<String>>,
    pub attributes: Arc<MemoryStore>,
    session: Arc<Mutex<Option<Arc<Session>>>>,
}

impl Request {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            method: "GET".to_string(),
            parameters: IndexMap::new(),
            attributes: Arc::new(MemoryStore::new()),
            session: Arc::new(Mutex::new(None)),
        }
    }

    /// Same request (attributes and session shared) with the parameters of
    /// `query` taking precedence over the existing ones.
    pub fn with_query(request: &Arc<Request>, query: &str) -> Arc<Request> {
        if query.is_empty() {
            return request.clone();
        }
        let mut parameters: IndexMap<String, Vec<String>> = IndexMap::new();
        for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
            parameters
                .entry(name.into_owned())
                .or_default()
                .push(value.into_owned());
        }
        for (name, values) in &request.parameters {
            parameters
                .entry(name.clone())
                .or_default()
                .extend(values.iter().cloned());
        }
        Arc::new(Request {
            uri: request.uri.clone(),
            method: request.method.clone(),
            parameters,
            attributes: request.attributes.clone(),
            session: request.session.clone(),
        })
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters
            .entry(name.into())
            .or_default()
            .push(value.into());
        self
    }

    pub fn with_session(self, session: Arc<Session>) -> Self {
        *self.session.lock() = Some(session);
        self
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn parameter_values(&self, name: &str) -> &[String] {
        self.parameters.get(name).map_or(&[], Vec::as_slice)
    }

    pub fn parameter_names(&self) -> impl Iterator<Item = &str> {
        self.parameters.keys().map(String::as_str)
    }

    /// Current session, creating one when `create` is set.
    pub fn session(&self, create: bool) -> Option<Arc<Session>> {
        let mut slot = self.session.lock();
        if slot.is_none() && create {
            let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
            *slot = Some(Arc::new(Session::new(format!("session-{id}"))));
        }
        slot.clone()
    }
}

#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    content_type: String,
    charset: Charset,
    pub headers: IndexMap<String, String>,
    pub body: Vec<u8>,
    included: bool,
}

impl Default for Response {
    fn default() -> Self {
        Self {
            status: 200,
            content_type: "text/html".to_string(),
            charset: Charset::DEFAULT,
            headers: IndexMap::new(),
            body: Vec::new(),
            included: false,
        }
    }
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    /// Response handed to a unit running inside an include; its body is
    /// captured into the including page's writer.
    pub fn for_include(charset: Charset) -> Self {
        Self {
            charset,
            included: true,
            ..Self::default()
        }
    }

    pub fn is_included(&self) -> bool {
        self.included
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn charset(&self) -> Charset {
        self.charset
    }

    /// Sets the content type; an included response keeps its encoding.
    pub fn set_content_type(&mut self, content_type: &str) {
        if self.included {
            return;
        }
        self.content_type = content_type.to_string();
        if let Some(charset) = Charset::from_content_type(content_type) {
            self.charset = charset;
        }
    }

    pub fn set_header(&mut self, name: &str, value: &str) {
        self.headers.insert(name.to_string(), value.to_string());
    }

    pub fn body_text(&self) -> String {
        self.charset.decode(&self.body)
    }

    /// Response for the target of a forward: same metadata, empty body, no
    /// include wrapper.
    pub(crate) fn for_forward(&self) -> Self {
        Self {
            status: self.status,
            content_type: self.content_type.clone(),
            charset: self.charset,
            headers: self.headers.clone(),
            body: Vec::new(),
            included: false,
        }
    }
}

/// A compiled template or servlet-like endpoint reachable by path.
pub trait Unit: Send + Sync {
    fn service(&self, exchange: Exchange) -> Result<Response, RenderError>;

    fn info(&self) -> &str {
        ""
    }

    /// Source files the unit was compiled from, for staleness checks.
    fn dependants(&self) -> &'static [&'static str] {
        &[]
    }

    fn destroy(&self) {}
}

pub type BeanFactory = Arc<dyn Fn() -> SharedBean + Send + Sync>;

/// Application scope plus the registries shared by every execution.
pub struct Application {
    name: String,
    pub attributes: MemoryStore,
    init_params: IndexMap<String, String>,
    units: RwLock<IndexMap<String, Arc<dyn Unit>>>,
    beans: RwLock<FxHashMap<String, BeanFactory>>,
    evaluator: Arc<dyn ExpressionEvaluator>,
}

impl Application {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: MemoryStore::new(),
            init_params: IndexMap::new(),
            units: RwLock::new(IndexMap::new()),
            beans: RwLock::new(FxHashMap::default()),
            evaluator: Arc::new(ScopedEvaluator),
        }
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn with_init_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.init_params.insert(name.into(), value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn init_param(&self, name: &str) -> Option<&str> {
        self.init_params.get(name).map(String::as_str)
    }

    pub fn evaluator(&self) -> Arc<dyn ExpressionEvaluator> {
        self.evaluator.clone()
    }

    pub fn register_unit(&self, path: impl Into<String>, unit: Arc<dyn Unit>) {
        self.units.write().insert(path.into(), unit);
    }

    pub fn unit(&self, path: &str) -> Result<Arc<dyn Unit>, RenderError> {
        let without_query = path.split('?').next().unwrap_or(path);
        self.units
            .read()
            .get(without_query)
            .cloned()
            .ok_or_else(|| RenderError::Servlet {
                message: format!("no unit registered at `{without_query}`"),
                root_cause: None,
            })
    }

    pub fn register_bean(&self, name: impl Into<String>, factory: BeanFactory) {
        self.beans.write().insert(name.into(), factory);
    }

    pub fn instantiate_bean(&self, name: &str) -> Result<SharedBean, RenderError> {
        let factory = self
            .beans
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| RenderError::Instantiation(format!("bean `{name}`")))?;
        Ok(factory())
    }

    /// Releases every registered unit.
    pub fn shutdown(&self) {
        for unit in self.units.read().values() {
            unit.destroy();
        }
    }
}

/// One request/response pair in flight.
pub struct Exchange {
    pub request: Arc<Request>,
    pub response: Response,
    pub application: Arc<Application>,
}

impl Exchange {
    pub fn new(request: Arc<Request>, application: Arc<Application>) -> Self {
        Self {
            request,
            response: Response::new(),
            application,
        }
    }

    /// Convenience entry point: dispatches `request` to the unit at its URI.
    pub fn dispatch(
        application: &Arc<Application>,
        request: Request,
    ) -> Result<Response, RenderError> {
        let unit = application.unit(request.uri())?;
        unit.service(Exchange::new(Arc::new(request), application.clone()))
    }
}
