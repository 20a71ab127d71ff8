use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::bean::{BeanSource, SharedBean};
use crate::charset::Charset;
use crate::error::RenderError;
use crate::exchange::{Application, Exchange, Request, Response, attrs};
use crate::scope::{AttributeStore, Scope, Session};
use crate::value::{ExpectedType, FromValue, Implicit, Value};
use crate::writer::{BodyContent, JspWriter, PageWriter};

/// Per-unit settings compiled into the generated source.
#[derive(Debug, Clone, Copy)]
pub struct PageSettings {
    pub unit_name: &'static str,
    pub content_type: &'static str,
    pub error_page: Option<&'static str>,
    pub needs_session: bool,
    pub buffer_size: usize,
    pub auto_flush: bool,
    pub powered_by: Option<&'static str>,
}

impl PageSettings {
    pub const fn new(unit_name: &'static str) -> Self {
        Self {
            unit_name,
            content_type: "text/html",
            error_page: None,
            needs_session: true,
            buffer_size: 8192,
            auto_flush: true,
            powered_by: None,
        }
    }
}

/// Handle to a pushed body buffer; valid until the next push at its depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyHandle(usize);

impl BodyHandle {
    pub fn depth(self) -> usize {
        self.0
    }
}

/// Identifies one page-scope table on the tag-scope stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeMark(usize);

type PageTable = IndexMap<String, Value>;

/// Per-execution state: the four attribute scopes, the output stack and the
/// dispatch entry points used by generated units.
pub struct PageContext {
    settings: PageSettings,
    request: Arc<Request>,
    response: Response,
    session: Option<Arc<Session>>,
    application: Arc<Application>,
    page_scopes: Vec<PageTable>,
    implicit_ready: bool,
    base: PageWriter,
    bodies: Vec<BodyContent>,
    depth: usize,
    forwarded: Option<Response>,
    same_encoding: Option<bool>,
}

impl PageContext {
    pub fn acquire(exchange: Exchange, settings: PageSettings) -> Result<Self, RenderError> {
        let Exchange {
            request,
            mut response,
            application,
        } = exchange;
        let session = request.session(settings.needs_session);
        if settings.needs_session && session.is_none() {
            return Err(RenderError::state("page needs a session and none is available"));
        }
        response.set_content_type(settings.content_type);
        if let Some(powered_by) = settings.powered_by {
            response.set_header("X-Powered-By", powered_by);
        }
        application
            .attributes
            .set(attrs::FIRST_REQUEST_SEEN, Value::Bool(true))?;
        let base = PageWriter::new(settings.buffer_size, settings.auto_flush, response.charset());
        debug!(unit = settings.unit_name, uri = request.uri(), "page context acquired");
        Ok(Self {
            settings,
            request,
            response,
            session,
            application,
            page_scopes: vec![PageTable::new()],
            implicit_ready: false,
            base,
            bodies: Vec::new(),
            depth: 0,
            forwarded: None,
            same_encoding: None,
        })
    }

    /// Flushes the page writer and hands back the finished response.
    pub fn release(self) -> Response {
        let PageContext {
            settings,
            mut response,
            base,
            forwarded,
            depth,
            ..
        } = self;
        if depth != 0 {
            warn!(unit = settings.unit_name, depth, "released with pushed bodies");
        }
        match forwarded {
            Some(forwarded) => forwarded,
            None => {
                response.body.extend(base.into_body());
                response
            }
        }
    }

    pub fn settings(&self) -> &PageSettings {
        &self.settings
    }

    pub fn request(&self) -> &Arc<Request> {
        &self.request
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn set_status(&mut self, status: u16) {
        self.response.status = status;
    }

    pub fn session(&self) -> Option<&Arc<Session>> {
        self.session.as_ref()
    }

    pub fn application(&self) -> &Arc<Application> {
        &self.application
    }

    // Attribute scopes

    fn check_name(name: &str) -> Result<(), RenderError> {
        if name.is_empty() {
            Err(RenderError::argument("attribute name is empty"))
        } else {
            Ok(())
        }
    }

    fn ensure_page_scope(&mut self) {
        if self.implicit_ready {
            return;
        }
        self.implicit_ready = true;
        let mut implicit = vec![
            Implicit::Out,
            Implicit::Request,
            Implicit::Response,
            Implicit::Page,
            Implicit::Config,
            Implicit::PageContext,
            Implicit::Application,
        ];
        if self.session.is_some() {
            implicit.insert(3, Implicit::Session);
        }
        let root = &mut self.page_scopes[0];
        for kind in implicit {
            root.insert(kind.binding_name().to_string(), Value::Implicit(kind));
        }
    }

    fn active_table(&self) -> &PageTable {
        let last = self.page_scopes.len() - 1;
        &self.page_scopes[last]
    }

    fn active_table_mut(&mut self) -> &mut PageTable {
        let last = self.page_scopes.len() - 1;
        &mut self.page_scopes[last]
    }

    fn shared_store(&self, scope: Scope) -> Result<&dyn AttributeStore, RenderError> {
        match scope {
            Scope::Page => Err(RenderError::argument("page scope is not a shared store")),
            Scope::Request => Ok(&*self.request.attributes),
            Scope::Session => match &self.session {
                Some(session) => Ok(&**session),
                None => Err(RenderError::state("no session for session-scoped attribute")),
            },
            Scope::Application => Ok(&self.application.attributes),
        }
    }

    pub fn get_attribute(&mut self, name: &str) -> Result<Option<Value>, RenderError> {
        Self::check_name(name)?;
        self.ensure_page_scope();
        Ok(self.active_table().get(name).cloned())
    }

    pub fn set_attribute(&mut self, name: &str, value: Value) -> Result<(), RenderError> {
        self.set_attribute_in(name, value, Scope::Page)
    }

    /// Removes `name` from every scope.
    pub fn remove_attribute(&mut self, name: &str) -> Result<(), RenderError> {
        Self::check_name(name)?;
        self.ensure_page_scope();
        self.active_table_mut().shift_remove(name);
        self.request.attributes.remove(name)?;
        if let Some(session) = &self.session {
            // An invalidated session has nothing left to remove.
            let _ = session.remove(name);
        }
        self.application.attributes.remove(name)?;
        Ok(())
    }

    pub fn get_attribute_in(
        &mut self,
        name: &str,
        scope: Scope,
    ) -> Result<Option<Value>, RenderError> {
        Self::check_name(name)?;
        match scope {
            Scope::Page => Ok(self.active_table().get(name).cloned()),
            other => Ok(self.shared_store(other)?.get(name)?),
        }
    }

    /// Binds `name` in `scope`; a null value removes the binding.
    pub fn set_attribute_in(
        &mut self,
        name: &str,
        value: Value,
        scope: Scope,
    ) -> Result<(), RenderError> {
        Self::check_name(name)?;
        match scope {
            Scope::Page => {
                let table = self.active_table_mut();
                if value.is_null() {
                    table.shift_remove(name);
                } else {
                    table.insert(name.to_string(), value);
                }
                Ok(())
            }
            other => Ok(self.shared_store(other)?.set(name, value)?),
        }
    }

    pub fn remove_attribute_in(&mut self, name: &str, scope: Scope) -> Result<(), RenderError> {
        Self::check_name(name)?;
        match scope {
            Scope::Page => {
                self.active_table_mut().shift_remove(name);
                Ok(())
            }
            other => Ok(self.shared_store(other)?.remove(name)?),
        }
    }

    pub fn attribute_names_in(&mut self, scope: Scope) -> Result<Vec<String>, RenderError> {
        match scope {
            Scope::Page => {
                self.ensure_page_scope();
                Ok(self.active_table().keys().cloned().collect())
            }
            other => Ok(self.shared_store(other)?.names()?),
        }
    }

    /// Searches page, request, session and application scope in that order.
    /// An invalidated session counts as a miss.
    pub fn find_attribute(&mut self, name: &str) -> Result<Option<Value>, RenderError> {
        Ok(self.locate(name)?.map(|(_, value)| value))
    }

    /// Scope holding the first binding `find_attribute` would return.
    pub fn attributes_scope(&mut self, name: &str) -> Result<Option<Scope>, RenderError> {
        Ok(self.locate(name)?.map(|(scope, _)| scope))
    }

    fn locate(&mut self, name: &str) -> Result<Option<(Scope, Value)>, RenderError> {
        Self::check_name(name)?;
        self.ensure_page_scope();
        if let Some(value) = self.active_table().get(name) {
            return Ok(Some((Scope::Page, value.clone())));
        }
        if let Some(value) = self.request.attributes.get(name)? {
            return Ok(Some((Scope::Request, value)));
        }
        if let Some(session) = &self.session {
            if let Ok(Some(value)) = session.get(name) {
                return Ok(Some((Scope::Session, value)));
            }
        }
        Ok(self
            .application
            .attributes
            .get(name)?
            .map(|value| (Scope::Application, value)))
    }

    // Tag-definition page scopes

    pub fn scope_mark(&self) -> ScopeMark {
        ScopeMark(self.page_scopes.len() - 1)
    }

    /// Starts a private page scope for a tag definition body and returns the
    /// mark of the invoking page's scope.
    pub fn enter_tag_scope(&mut self) -> ScopeMark {
        let invoking = self.scope_mark();
        self.page_scopes.push(PageTable::new());
        invoking
    }

    /// Copies the named variables from the active page scope into the
    /// invoking page's scope; unbound names are removed there.
    pub fn sync_to_invoking(&mut self, invoking: ScopeMark, names: &[&str]) {
        let values: Vec<(String, Option<Value>)> = names
            .iter()
            .map(|n| (n.to_string(), self.active_table().get(*n).cloned()))
            .collect();
        if let Some(target) = self.page_scopes.get_mut(invoking.0) {
            for (name, value) in values {
                match value {
                    Some(value) => {
                        target.insert(name, value);
                    }
                    None => {
                        target.shift_remove(&name);
                    }
                }
            }
        }
    }

    /// Like [`Self::sync_to_invoking`], for code that only knows it runs in
    /// a tag scope: the invoking scope is the one directly below.
    pub fn sync_to_caller(&mut self, names: &[&str]) {
        if let Some(invoking) = self.page_scopes.len().checked_sub(2) {
            self.sync_to_invoking(ScopeMark(invoking), names);
        }
    }

    pub fn exit_tag_scope(&mut self, invoking: ScopeMark) {
        self.page_scopes.truncate(invoking.0 + 1);
    }

    /// Runs `f` with the page scope identified by `mark` active.
    pub fn run_in_scope<R>(&mut self, mark: ScopeMark, f: impl FnOnce(&mut Self) -> R) -> R {
        let split = (mark.0 + 1).min(self.page_scopes.len());
        let hidden = self.page_scopes.split_off(split);
        let result = f(self);
        self.page_scopes.truncate(split);
        self.page_scopes.extend(hidden);
        result
    }

    // Output stack

    pub fn out(&mut self) -> &mut dyn JspWriter {
        match self
            .depth
            .checked_sub(1)
            .and_then(|idx| self.bodies.get_mut(idx))
        {
            Some(body) => body as &mut dyn JspWriter,
            None => &mut self.base,
        }
    }

    /// The page writer, regardless of pushed bodies.
    pub fn base_out(&mut self) -> &mut PageWriter {
        &mut self.base
    }

    pub fn body_depth(&self) -> usize {
        self.depth
    }

    /// Makes a fresh buffer the current output. Buffers are reused across
    /// pushes at the same depth and cleared on reuse.
    pub fn push_body(&mut self) -> BodyHandle {
        match self.bodies.get_mut(self.depth) {
            Some(body) => body.clear_body(),
            None => self.bodies.push(BodyContent::default()),
        }
        self.depth += 1;
        self.rebind_out();
        BodyHandle(self.depth)
    }

    pub fn pop_body(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        self.rebind_out();
    }

    fn rebind_out(&mut self) {
        self.active_table_mut()
            .insert(Implicit::Out.binding_name().to_string(), Value::Implicit(Implicit::Out));
    }

    pub fn body_text(&self, handle: BodyHandle) -> String {
        handle
            .0
            .checked_sub(1)
            .and_then(|idx| self.bodies.get(idx))
            .map(|body| body.text().to_string())
            .unwrap_or_default()
    }

    pub fn body_content_mut(&mut self, handle: BodyHandle) -> Option<&mut BodyContent> {
        let idx = handle.0.checked_sub(1)?;
        self.bodies.get_mut(idx)
    }

    /// Writer that was current when `handle` was pushed.
    pub fn enclosing_writer(&mut self, handle: BodyHandle) -> &mut dyn JspWriter {
        match handle
            .0
            .checked_sub(2)
            .and_then(|idx| self.bodies.get_mut(idx))
        {
            Some(body) => body as &mut dyn JspWriter,
            None => &mut self.base,
        }
    }

    /// Writes a pre-encoded literal when the response encoding matches the
    /// one it was encoded with, and the text otherwise.
    pub fn write_encoded(
        &mut self,
        encoding: &str,
        bytes: &[u8],
        text: &str,
    ) -> Result<(), RenderError> {
        let same = match self.same_encoding {
            Some(same) => same,
            None => {
                let same = Charset::from_label(encoding) == Some(self.response.charset());
                self.same_encoding = Some(same);
                same
            }
        };
        if same && self.depth == 0 {
            self.base.write_bytes(bytes)
        } else {
            self.out().write_str(text)
        }
    }

    /// Clears the page buffer before error routing; no-op when unbuffered.
    pub fn clear_page_buffer(&mut self) {
        if self.base.buffer_size() != 0 {
            let _ = self.base.clear_buffer();
        }
    }

    // Expressions

    pub fn evaluate(
        &mut self,
        expression: &str,
        expected: ExpectedType,
    ) -> Result<Value, RenderError> {
        let evaluator = self.application.evaluator();
        evaluator.evaluate(expression, expected, self)
    }

    pub fn evaluate_as<T: FromValue>(&mut self, expression: &str) -> Result<T, RenderError> {
        let value = self.evaluate(expression, T::EXPECTED)?;
        T::from_value(&value).ok_or_else(|| RenderError::Expression {
            expression: expression.to_string(),
            message: format!("cannot coerce to {}", std::any::type_name::<T>()),
        })
    }

    // Beans

    /// Finds `id` in `scope` or creates it from `source`; the flag reports
    /// whether a new bean was stored.
    pub fn use_bean(
        &mut self,
        id: &str,
        scope: Scope,
        source: BeanSource,
    ) -> Result<(SharedBean, bool), RenderError> {
        Self::check_name(id)?;
        let application = self.application.clone();
        let mut create = || -> Result<Value, RenderError> {
            match source {
                BeanSource::Factory(factory) => Ok(Value::Bean(factory())),
                BeanSource::Named(name) => application.instantiate_bean(name).map(Value::Bean),
                BeanSource::Absent => Err(RenderError::Instantiation(format!(
                    "bean `{id}` not found within scope"
                ))),
            }
        };
        let (value, created) = match scope {
            Scope::Page => match self.active_table().get(id).cloned() {
                Some(existing) => (existing, false),
                None => {
                    let value = create()?;
                    self.active_table_mut().insert(id.to_string(), value.clone());
                    (value, true)
                }
            },
            other => self.shared_store(other)?.get_or_insert(id, &mut create)?,
        };
        match value {
            Value::Bean(bean) => Ok((bean, created)),
            _ => Err(RenderError::Property(format!("attribute `{id}` is not a bean"))),
        }
    }

    // Dispatch

    fn resolve_path(&self, path: &str) -> String {
        if path.starts_with('/') {
            return path.to_string();
        }
        let uri = self.request.uri();
        match uri.rfind('/') {
            Some(idx) => format!("{}{}", &uri[..=idx], path),
            None => format!("/{path}"),
        }
    }

    fn split_query(path: &str) -> (&str, &str) {
        match path.split_once('?') {
            Some((target, query)) => (target, query),
            None => (path, ""),
        }
    }

    /// Renders the unit at `path` into the current output.
    pub fn include(&mut self, path: &str, flush: bool) -> Result<(), RenderError> {
        let resolved = self.resolve_path(path);
        let (target, query) = Self::split_query(&resolved);
        if flush && self.depth == 0 {
            self.base.flush()?;
        }
        let unit = self.application.unit(target)?;
        let previous = self.request.attributes.get(attrs::INCLUDE_PATH)?;
        self.request
            .attributes
            .set(attrs::INCLUDE_PATH, Value::from(target))?;
        let exchange = Exchange {
            request: Request::with_query(&self.request, query),
            response: Response::for_include(self.response.charset()),
            application: self.application.clone(),
        };
        let result = unit.service(exchange);
        self.request
            .attributes
            .set(attrs::INCLUDE_PATH, previous.unwrap_or(Value::Null))?;
        let included = result?;
        let text = included.body_text();
        self.out().write_str(&text)
    }

    /// Hands the request to the unit at `path`. Fails with a state error if
    /// output has already been committed.
    pub fn forward(&mut self, path: &str) -> Result<(), RenderError> {
        if self.out().clear().is_err() || self.base.is_flushed() {
            return Err(RenderError::state(
                "attempt to forward after the response was committed",
            ));
        }
        let _ = self.base.clear_buffer();
        let resolved = self.resolve_path(path);
        let (target, query) = Self::split_query(&resolved);
        let unit = self.application.unit(target)?;

        // The target must not see the include wrapper of an enclosing include.
        let include_path = self.request.attributes.get(attrs::INCLUDE_PATH)?;
        self.request.attributes.remove(attrs::INCLUDE_PATH)?;
        self.request
            .attributes
            .set(attrs::FORWARD_SEEN, Value::Bool(true))?;
        let exchange = Exchange {
            request: Request::with_query(&self.request, query),
            response: self.response.for_forward(),
            application: self.application.clone(),
        };
        let result = unit.service(exchange);
        if let Some(include_path) = include_path {
            self.request
                .attributes
                .set(attrs::INCLUDE_PATH, include_path)?;
        }
        self.forwarded = Some(result?);
        Ok(())
    }

    // Errors

    /// Failure being reported to an error page, if this request carries one.
    pub fn get_exception(&mut self) -> Option<Arc<RenderError>> {
        let attributes = &self.request.attributes;
        let found = match attributes.get(attrs::ERROR_EXCEPTION).ok().flatten() {
            Some(found) => found,
            None => {
                let found = attributes.get(attrs::JSP_EXCEPTION).ok().flatten()?;
                let _ = attributes.set(attrs::ERROR_EXCEPTION, found.clone());
                found
            }
        };
        found.downcast_arc::<RenderError>()
    }

    /// Routes a failure to the configured error page, or re-raises it.
    pub fn handle_page_exception(&mut self, err: RenderError) -> Result<(), RenderError> {
        let Some(error_page) = self.settings.error_page.filter(|p| !p.is_empty()) else {
            return Err(Self::rethrow(err));
        };
        debug!(unit = self.settings.unit_name, error_page, error = %err, "routing to error page");
        let err = Arc::new(err);
        let attributes = self.request.attributes.clone();
        attributes.set(attrs::JSP_EXCEPTION, Value::Object(err.clone()))?;
        attributes.set(attrs::ERROR_STATUS_CODE, Value::Int(500))?;
        attributes.set(attrs::ERROR_REQUEST_URI, Value::from(self.request.uri()))?;
        attributes.set(attrs::ERROR_UNIT_NAME, Value::from(self.settings.unit_name))?;
        match self.forward(error_page) {
            Err(RenderError::State(reason)) => {
                debug!(%reason, "forward to error page refused, including instead");
                self.include(error_page, true)?;
            }
            other => other?,
        }

        // The error page may have run inside an include.
        if let Some(current) = attributes.get(attrs::ERROR_EXCEPTION)? {
            if current.same_object(&err) {
                attributes.remove(attrs::ERROR_EXCEPTION)?;
                attributes.set(attrs::ERROR_HANDLED, Value::Bool(true))?;
            }
        }
        attributes.remove(attrs::ERROR_STATUS_CODE)?;
        attributes.remove(attrs::ERROR_REQUEST_URI)?;
        attributes.remove(attrs::JSP_EXCEPTION)?;
        Ok(())
    }

    fn rethrow(err: RenderError) -> RenderError {
        match err {
            RenderError::Io(_)
            | RenderError::State(_)
            | RenderError::Argument(_)
            | RenderError::Servlet { .. }
            | RenderError::SkipPage => err,
            other => {
                let message = other.to_string();
                let root_cause = other.deepest_cause().unwrap_or_else(|| Arc::new(other));
                RenderError::Servlet {
                    message,
                    root_cause: Some(root_cause),
                }
            }
        }
    }
}
