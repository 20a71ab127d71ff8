use std::sync::Arc;

use proptest::prelude::*;
use tessera_runtime::{
    Application, AttributeStore, Exchange, PageContext, PageSettings, RenderError, Request, Scope,
    Session, Value,
};

fn context_for(request: Request, application: &Arc<Application>) -> PageContext {
    let exchange = Exchange::new(Arc::new(request), application.clone());
    PageContext::acquire(exchange, PageSettings::new("scopes")).expect("acquire")
}

#[test]
fn request_binding_shadows_application_binding() {
    let application = Arc::new(Application::new("app"));
    application.attributes.set("x", Value::from("app")).unwrap();
    let request = Request::new("/a.tsr");
    request.attributes.set("x", Value::from("req")).unwrap();
    let mut ctx = context_for(request, &application);

    assert_eq!(ctx.find_attribute("x").unwrap(), Some(Value::from("req")));
    assert_eq!(ctx.attributes_scope("x").unwrap(), Some(Scope::Request));
}

#[test]
fn invalidated_session_counts_as_a_miss() {
    let application = Arc::new(Application::new("app"));
    application.attributes.set("user", Value::from("fallback")).unwrap();
    let session = Arc::new(Session::new("s-1"));
    session.set("user", Value::from("ada")).unwrap();
    let mut ctx = context_for(Request::new("/a.tsr").with_session(session.clone()), &application);

    assert_eq!(ctx.find_attribute("user").unwrap(), Some(Value::from("ada")));
    session.invalidate();
    assert_eq!(ctx.find_attribute("user").unwrap(), Some(Value::from("fallback")));
    assert!(matches!(
        ctx.get_attribute_in("user", Scope::Session),
        Err(RenderError::State(_))
    ));
}

#[test]
fn implicit_bindings_appear_on_first_page_access() {
    let application = Arc::new(Application::new("app"));
    let mut ctx = context_for(Request::new("/a.tsr"), &application);

    let names = ctx.attribute_names_in(Scope::Page).unwrap();
    for expected in [
        "out",
        "request",
        "response",
        "session",
        "page",
        "config",
        "pageContext",
        "application",
    ] {
        assert!(names.iter().any(|n| n == expected), "missing {expected}");
    }
}

#[test]
fn empty_names_and_missing_sessions_are_rejected() {
    let application = Arc::new(Application::new("app"));
    let exchange = Exchange::new(Arc::new(Request::new("/a.tsr")), application);
    let mut settings = PageSettings::new("no-session");
    settings.needs_session = false;
    let mut ctx = PageContext::acquire(exchange, settings).unwrap();

    assert!(matches!(ctx.get_attribute(""), Err(RenderError::Argument(_))));
    assert!(matches!(
        ctx.set_attribute_in("k", Value::Int(1), Scope::Session),
        Err(RenderError::State(_))
    ));
    assert!(ctx.session().is_none());
}

#[test]
fn null_set_and_unscoped_remove() {
    let application = Arc::new(Application::new("app"));
    let mut ctx = context_for(Request::new("/a.tsr"), &application);

    ctx.set_attribute_in("k", Value::Int(1), Scope::Request).unwrap();
    ctx.set_attribute_in("k", Value::Int(2), Scope::Application).unwrap();
    ctx.set_attribute("k", Value::Int(3)).unwrap();
    ctx.set_attribute("k", Value::Null).unwrap();
    assert_eq!(ctx.find_attribute("k").unwrap(), Some(Value::Int(1)));

    ctx.remove_attribute("k").unwrap();
    assert_eq!(ctx.find_attribute("k").unwrap(), None);
}

#[test]
fn tag_scope_is_private_and_syncs_back() {
    let application = Arc::new(Application::new("app"));
    let mut ctx = context_for(Request::new("/a.tsr"), &application);
    ctx.set_attribute("outer", Value::from("page")).unwrap();

    let invoking = ctx.enter_tag_scope();
    assert_eq!(ctx.get_attribute("outer").unwrap(), None);
    ctx.set_attribute("result", Value::Int(9)).unwrap();
    ctx.sync_to_invoking(invoking, &["result", "unbound"]);
    let seen_from_page = ctx.run_in_scope(invoking, |ctx| ctx.get_attribute("result"));
    ctx.exit_tag_scope(invoking);

    assert_eq!(seen_from_page.unwrap(), Some(Value::Int(9)));
    assert_eq!(ctx.get_attribute("result").unwrap(), Some(Value::Int(9)));
    assert_eq!(ctx.get_attribute("outer").unwrap(), Some(Value::from("page")));
}

proptest! {
    #[test]
    fn lookup_returns_the_earliest_scope(
        in_page in any::<bool>(),
        in_request in any::<bool>(),
        in_session in any::<bool>(),
        in_application in any::<bool>(),
    ) {
        let application = Arc::new(Application::new("app"));
        let mut ctx = context_for(Request::new("/p.tsr"), &application);
        let flags = [in_page, in_request, in_session, in_application];
        for (scope, set) in Scope::SEARCH_ORDER.into_iter().zip(flags) {
            if set {
                ctx.set_attribute_in("v", Value::Int(i64::from(scope.id())), scope).unwrap();
            }
        }

        let expected = Scope::SEARCH_ORDER
            .into_iter()
            .zip(flags)
            .find(|(_, set)| *set)
            .map(|(scope, _)| scope);
        prop_assert_eq!(ctx.attributes_scope("v").unwrap(), expected);
        prop_assert_eq!(
            ctx.find_attribute("v").unwrap(),
            expected.map(|scope| Value::Int(i64::from(scope.id())))
        );
    }
}
