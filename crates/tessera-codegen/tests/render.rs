//! Generated units compiled against the runtime and run, one line of output
//! per unit.

mod unit_fixture;

use std::sync::OnceLock;

use indexmap::IndexMap;
use tessera_codegen::{
    AttrValue, ChildInfo, ClassicKind, GeneratorOptions, Lifecycle, Node, NodeKind, PageInfo,
    ParamType, ScopeName, ScriptingVariable, SetterInfo, TagAttribute, TagBinding,
    TagDefAttribute, TagDefVariable, TagDefinition, TagNode, UnitKind, VarScope, generate,
};
use unit_fixture::{assert_cargo_success, cargo_run_fixture, stdout_text};

const HANDLERS: &str = r#"use std::sync::atomic::{AtomicUsize, Ordering};

use tessera_runtime::prelude::*;

pub static CAUGHT: AtomicUsize = AtomicUsize::new(0);
pub static FINALLY: AtomicUsize = AtomicUsize::new(0);

/// Runs its body `count` times and exposes `i`, counting from `start`.
#[derive(Default)]
pub struct Loop {
    support: TagSupport,
    count: parking_lot::Mutex<i64>,
    start: parking_lot::Mutex<i64>,
    index: parking_lot::Mutex<i64>,
}

impl Loop {
    pub fn set_count(&self, count: i64) {
        *self.count.lock() = count;
    }

    pub fn set_start(&self, start: i64) {
        *self.start.lock() = start;
    }

    fn expose(&self, ctx: &mut PageContext) -> Result<(), RenderError> {
        let i = *self.start.lock() + *self.index.lock();
        ctx.set_attribute("i", Value::Int(i))
    }
}

impl JspTag for Loop {
    fn parent(&self) -> Option<TagRef> {
        self.support.parent()
    }
}

impl Tag for Loop {
    fn set_parent(&self, parent: Option<TagRef>) {
        self.support.set_parent(parent);
    }

    fn do_start_tag(&self, ctx: &mut PageContext) -> Result<StartResult, RenderError> {
        *self.index.lock() = 0;
        if *self.count.lock() <= 0 {
            return Ok(StartResult::SkipBody);
        }
        self.expose(ctx)?;
        Ok(StartResult::IncludeBody)
    }
}

impl IterationTag for Loop {
    fn do_after_body(&self, ctx: &mut PageContext) -> Result<AfterBody, RenderError> {
        let next = {
            let mut index = self.index.lock();
            *index += 1;
            *index
        };
        if next >= *self.count.lock() {
            return Ok(AfterBody::Done);
        }
        self.expose(ctx)?;
        Ok(AfterBody::Again)
    }
}

#[derive(Default)]
pub struct When {
    support: TagSupport,
    test: parking_lot::Mutex<bool>,
}

impl When {
    pub fn set_test(&self, test: bool) {
        *self.test.lock() = test;
    }
}

impl JspTag for When {
    fn parent(&self) -> Option<TagRef> {
        self.support.parent()
    }
}

impl Tag for When {
    fn set_parent(&self, parent: Option<TagRef>) {
        self.support.set_parent(parent);
    }

    fn do_start_tag(&self, _ctx: &mut PageContext) -> Result<StartResult, RenderError> {
        if *self.test.lock() {
            Ok(StartResult::IncludeBody)
        } else {
            Ok(StartResult::SkipBody)
        }
    }
}

#[derive(Default)]
pub struct Stop {
    support: TagSupport,
}

impl JspTag for Stop {
    fn parent(&self) -> Option<TagRef> {
        self.support.parent()
    }
}

impl Tag for Stop {
    fn set_parent(&self, parent: Option<TagRef>) {
        self.support.set_parent(parent);
    }

    fn do_end_tag(&self, _ctx: &mut PageContext) -> Result<EndResult, RenderError> {
        Ok(EndResult::SkipPage)
    }
}

#[derive(Default)]
pub struct Fail {
    support: TagSupport,
}

impl JspTag for Fail {
    fn parent(&self) -> Option<TagRef> {
        self.support.parent()
    }
}

impl Tag for Fail {
    fn set_parent(&self, parent: Option<TagRef>) {
        self.support.set_parent(parent);
    }

    fn do_start_tag(&self, _ctx: &mut PageContext) -> Result<StartResult, RenderError> {
        Err(RenderError::state("boom"))
    }
}

/// Buffers its body and writes it back upper-cased.
#[derive(Default)]
pub struct Upper {
    body: BodyTagSupport,
}

impl JspTag for Upper {
    fn parent(&self) -> Option<TagRef> {
        self.body.support.parent()
    }
}

impl Tag for Upper {
    fn set_parent(&self, parent: Option<TagRef>) {
        self.body.support.set_parent(parent);
    }

    fn do_start_tag(&self, _ctx: &mut PageContext) -> Result<StartResult, RenderError> {
        Ok(StartResult::BufferBody)
    }

    fn do_end_tag(&self, ctx: &mut PageContext) -> Result<EndResult, RenderError> {
        if let Some(handle) = self.body.body_content() {
            let text = ctx.body_text(handle).to_uppercase();
            ctx.out().write_str(&text)?;
        }
        Ok(EndResult::Continue)
    }

    fn release(&self) {
        self.body.release();
    }
}

impl IterationTag for Upper {
    fn do_after_body(&self, _ctx: &mut PageContext) -> Result<AfterBody, RenderError> {
        Ok(AfterBody::Done)
    }
}

impl BodyTag for Upper {
    fn set_body_content(&self, body: BodyHandle) {
        self.body.set_body_content(body);
    }
}

/// Swallows state errors raised in its body.
#[derive(Default)]
pub struct Catch {
    support: TagSupport,
}

impl JspTag for Catch {
    fn parent(&self) -> Option<TagRef> {
        self.support.parent()
    }
}

impl Tag for Catch {
    fn set_parent(&self, parent: Option<TagRef>) {
        self.support.set_parent(parent);
    }

    fn do_start_tag(&self, _ctx: &mut PageContext) -> Result<StartResult, RenderError> {
        Ok(StartResult::IncludeBody)
    }
}

impl TryCatchFinally for Catch {
    fn do_catch(&self, err: RenderError) -> Result<(), RenderError> {
        match err {
            RenderError::State(_) => {
                CAUGHT.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            other => Err(other),
        }
    }

    fn do_finally(&self) {
        FINALLY.fetch_add(1, Ordering::SeqCst);
    }
}

/// Renders its body fragment twice.
#[derive(Default)]
pub struct Repeat {
    support: SimpleTagSupport,
}

impl JspTag for Repeat {
    fn parent(&self) -> Option<TagRef> {
        self.support.parent()
    }
}

impl SimpleTag for Repeat {
    fn set_parent(&self, parent: Option<TagRef>) {
        self.support.set_parent(parent);
    }

    fn set_body(&self, body: Fragment) {
        self.support.set_body(body);
    }

    fn do_tag(&self, ctx: &mut PageContext) -> Result<(), RenderError> {
        let Some(body) = self.support.body() else {
            return Ok(());
        };
        body.invoke(ctx)?;
        let again = body.invoke_to_string(ctx)?;
        ctx.out().write_str(&again)
    }
}
"#;

const MAIN: &str = r#"mod buffer;
mod greet;
mod greeting;
mod guard;
mod iter;
mod skip;
mod tags;
mod twice;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use tessera_runtime::{Application, Exchange, Request, Unit};

fn render(unit: &dyn Unit, app: &Arc<Application>) -> String {
    let exchange = Exchange::new(Arc::new(Request::new("/fixture.tsr")), app.clone());
    match unit.service(exchange) {
        Ok(response) => String::from_utf8_lossy(&response.body).into_owned(),
        Err(err) => format!("error: {err}"),
    }
}

fn main() {
    let app = Arc::new(Application::new("fixture"));
    println!("iter={}", render(&iter::Iter, &app));
    println!("skip={}", render(&skip::Skip, &app));
    println!("buffer={}", render(&buffer::Buffer, &app));
    println!("guard={}", render(&guard::Guard, &app));
    println!("twice={}", render(&twice::Twice, &app));
    println!("greet={}", render(&greet::Greet, &app));
    println!(
        "catch={}/{}",
        tags::CAUGHT.load(Ordering::SeqCst),
        tags::FINALLY.load(Ordering::SeqCst)
    );
    iter::Iter.destroy();
}
"#;

fn text(text: &str) -> Node {
    Node::new(NodeKind::TemplateText { text: text.into() })
}

fn expr(code: &str) -> Node {
    Node::new(NodeKind::Expression { code: code.into() })
}

fn binding(handler: &str, lifecycle: Lifecycle, setters: &[(&str, ParamType)]) -> TagBinding {
    let setters: IndexMap<String, SetterInfo> = setters
        .iter()
        .map(|(name, ty)| {
            (
                (*name).to_string(),
                SetterInfo {
                    method: format!("set_{name}"),
                    param_type: ty.clone(),
                    editor: None,
                },
            )
        })
        .collect();
    TagBinding {
        handler: format!("crate::{handler}"),
        lifecycle,
        setters,
        dynamic_attributes: false,
    }
}

fn tag(local: &str, binding: TagBinding, attrs: &[(&str, &str)]) -> TagNode {
    TagNode {
        prefix: "t".into(),
        local_name: local.into(),
        binding: Some(binding),
        attributes: attrs
            .iter()
            .map(|(name, value)| TagAttribute {
                name: (*name).into(),
                uri: None,
                value: AttrValue::Literal((*value).into()),
                dynamic: false,
            })
            .collect(),
        variables: Vec::new(),
        nesting_level: 0,
        has_empty_body: true,
        child_info: ChildInfo::default(),
    }
}

fn with_body(mut tag: TagNode, children: Vec<Node>) -> Node {
    tag.has_empty_body = children.is_empty();
    Node::new(NodeKind::ExtensionTag(tag)).with_children(children)
}

fn counter(start: &str, nesting_level: u32) -> TagNode {
    let mut each = tag(
        "loop",
        binding(
            "tags::Loop",
            Lifecycle::ClassicIterating,
            &[("count", ParamType::I64), ("start", ParamType::I64)],
        ),
        &[("count", "2"), ("start", start)],
    );
    each.nesting_level = nesting_level;
    each.variables.push(ScriptingVariable {
        name: Some("i".into()),
        name_from_attribute: None,
        type_name: "i64".into(),
        scope: VarScope::Nested,
        declare: nesting_level == 0,
    });
    each
}

fn upper() -> TagNode {
    tag("upper", binding("tags::Upper", Lifecycle::ClassicBuffered, &[]), &[])
}

fn page_units() -> Vec<(&'static str, Vec<Node>)> {
    let shown_i = || vec![text("["), expr("i.unwrap_or(-1)"), text("]")];
    let mut outer_body = shown_i();
    outer_body.push(with_body(
        counter("10", 1),
        vec![text("("), expr("i.unwrap_or(-1)"), text(")")],
    ));
    outer_body.extend(shown_i());
    let iter = vec![with_body(counter("0", 0), outer_body)];

    let when = |test: &str| {
        tag(
            "when",
            binding("tags::When", Lifecycle::Classic, &[("test", ParamType::Bool)]),
            &[("test", test)],
        )
    };
    let skip = vec![
        text("a"),
        with_body(when("false"), vec![text("never")]),
        with_body(when("true"), vec![text("b")]),
        with_body(tag("stop", binding("tags::Stop", Lifecycle::Classic, &[]), &[]), vec![]),
        text("c"),
    ];

    let buffer = vec![
        text("<"),
        with_body(upper(), vec![text("abc"), expr("\"x\"")]),
        text(">"),
    ];

    let catch = tag(
        "catch",
        binding(
            "tags::Catch",
            Lifecycle::ClassicInterposing {
                inner: ClassicKind::Plain,
            },
            &[],
        ),
        &[],
    );
    let fail = tag("fail", binding("tags::Fail", Lifecycle::Classic, &[]), &[]);
    let guard = vec![
        text("before"),
        with_body(
            catch,
            vec![with_body(upper(), vec![text("lost"), with_body(fail, vec![])])],
        ),
        text("|after"),
    ];

    let repeat = tag("repeat", binding("tags::Repeat", Lifecycle::Fragment, &[]), &[]);
    let twice = vec![text("<"), with_body(repeat, vec![text("hey ")]), text(">")];

    let mut greeting = tag(
        "greeting",
        binding("greeting::Greeting", Lifecycle::Fragment, &[("name", ParamType::Text)]),
        &[("name", "Ada")],
    );
    greeting.variables.push(ScriptingVariable {
        name: Some("count".into()),
        name_from_attribute: None,
        type_name: "i64".into(),
        scope: VarScope::AtEnd,
        declare: true,
    });
    let greet = vec![
        with_body(greeting, vec![text("body")]),
        text("="),
        expr("count.unwrap_or(0)"),
    ];

    vec![
        ("iter", iter),
        ("skip", skip),
        ("buffer", buffer),
        ("guard", guard),
        ("twice", twice),
        ("greet", greet),
    ]
}

fn greeting_definition() -> (PageInfo, Vec<Node>) {
    let mut page = PageInfo::new("greeting");
    page.kind = UnitKind::TagDefinition(TagDefinition {
        attributes: vec![TagDefAttribute {
            name: "name".into(),
            param_type: ParamType::Text,
        }],
        variables: vec![TagDefVariable {
            name: "count".into(),
            scope: VarScope::AtEnd,
        }],
        dynamic_attributes: None,
    });
    let nodes = vec![
        text("Hi "),
        Node::new(NodeKind::ElExpression {
            expression: "name".into(),
        }),
        text(" ["),
        Node::new(NodeKind::DoBody {
            var: None,
            var_reader: None,
            scope: ScopeName::Page,
        }),
        text("]"),
        Node::new(NodeKind::Scriptlet {
            code: "ctx.set_attribute(\"count\", Value::Int(7))?;".into(),
        }),
    ];
    (page, nodes)
}

/// Output of the fixture binary, built once per test run.
fn fixture_stdout() -> &'static str {
    static STDOUT: OnceLock<String> = OnceLock::new();
    STDOUT.get_or_init(|| {
        let options = GeneratorOptions::default();
        let mut units: Vec<(&str, String)> = page_units()
            .into_iter()
            .map(|(name, nodes)| {
                let source = generate(&nodes, &PageInfo::new(name), &options)
                    .unwrap_or_else(|err| panic!("generating {name}: {err}"));
                (name, source)
            })
            .collect();
        let (page, nodes) = greeting_definition();
        units.push(("greeting", generate(&nodes, &page, &options).unwrap()));

        let mut modules: Vec<(&str, &str)> = units
            .iter()
            .map(|(name, source)| (*name, source.as_str()))
            .collect();
        modules.push(("tags", HANDLERS));

        let dir = tempfile::tempdir().unwrap();
        let output = cargo_run_fixture(dir.path(), &modules, MAIN);
        assert_cargo_success(&output);
        stdout_text(&output)
    })
}

fn rendered(unit: &str) -> &'static str {
    let prefix = format!("{unit}=");
    fixture_stdout()
        .lines()
        .find_map(|line| line.strip_prefix(prefix.as_str()))
        .unwrap_or_else(|| panic!("no output for {unit}:\n{}", fixture_stdout()))
}

#[test]
fn iteration_revisits_the_body_and_nested_tags_restore_variables() {
    assert_eq!(rendered("iter"), "[0](10)(11)[0][1](10)(11)[1]");
}

#[test]
fn skipped_bodies_and_skip_page_stop_output() {
    assert_eq!(rendered("skip"), "ab");
}

#[test]
fn buffered_bodies_reach_the_handler() {
    assert_eq!(rendered("buffer"), "<ABCX>");
}

#[test]
fn failures_inside_interposing_tags_pop_pushed_bodies() {
    assert_eq!(rendered("guard"), "before|after");
    assert_eq!(rendered("catch"), "1/1");
}

#[test]
fn fragments_can_be_invoked_repeatedly() {
    assert_eq!(rendered("twice"), "<hey hey >");
}

#[test]
fn tag_definitions_render_the_caller_body_and_sync_variables_back() {
    assert_eq!(rendered("greet"), "Hi Ada [body]=7");
}
