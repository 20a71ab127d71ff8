use std::any::Any;
use std::sync::Arc;

use tessera_runtime::{
    Application, Bean, BeanSource, Exchange, PageContext, PageSettings, RenderError, Request,
    Scope, SharedBean, Value, find_bean, handle_get_property, introspect, set_property_from_param,
    shared_bean, with_bean,
};

#[derive(Debug, Default)]
struct Profile {
    name: String,
    age: i64,
}

impl Bean for Profile {
    fn property(&self, name: &str) -> Option<Value> {
        match name {
            "name" => Some(Value::from(self.name.as_str())),
            "age" => Some(Value::Int(self.age)),
            _ => None,
        }
    }

    fn set_property(&mut self, name: &str, value: Value) -> Result<(), RenderError> {
        match (name, value) {
            ("name", Value::Text(text)) => self.name = text,
            ("age", Value::Text(text)) => {
                self.age = text
                    .parse()
                    .map_err(|_| RenderError::Property(format!("bad age `{text}`")))?;
            }
            (other, _) => {
                return Err(RenderError::Property(format!("cannot set `{other}`")));
            }
        }
        Ok(())
    }

    fn property_names(&self) -> Vec<&'static str> {
        vec!["name", "age"]
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn new_profile() -> SharedBean {
    shared_bean(Profile::default())
}

fn context(request: Request, app: Arc<Application>) -> PageContext {
    let exchange = Exchange::new(Arc::new(request), app);
    PageContext::acquire(exchange, PageSettings::new("beans")).unwrap()
}

#[test]
fn use_bean_creates_once_per_scope() {
    let app = Arc::new(Application::new("beans"));
    let mut ctx = context(Request::new("/b.tsr"), app);

    let (first, created) = ctx
        .use_bean("profile", Scope::Request, BeanSource::Factory(new_profile))
        .unwrap();
    assert!(created);
    let (again, created) = ctx
        .use_bean("profile", Scope::Request, BeanSource::Factory(new_profile))
        .unwrap();
    assert!(!created);
    assert!(Arc::ptr_eq(&first, &again));
    assert!(Arc::ptr_eq(&find_bean(&mut ctx, "profile").unwrap(), &first));
}

#[test]
fn named_beans_come_from_the_application_registry() {
    let app = Arc::new(Application::new("beans"));
    app.register_bean("profile", Arc::new(new_profile));
    let mut ctx = context(Request::new("/b.tsr"), app);

    let (bean, created) = ctx
        .use_bean("p", Scope::Application, BeanSource::Named("profile"))
        .unwrap();
    assert!(created);
    with_bean::<Profile, _>(&bean, |profile| profile.name = "ada".into()).unwrap();
    assert_eq!(
        handle_get_property(&mut ctx, "p", "name").unwrap(),
        Value::from("ada")
    );

    let missing = ctx.use_bean("q", Scope::Page, BeanSource::Named("nobody"));
    assert!(matches!(missing, Err(RenderError::Instantiation(_))));
    let absent = ctx.use_bean("r", Scope::Page, BeanSource::Absent);
    assert!(matches!(absent, Err(RenderError::Instantiation(_))));
}

#[test]
fn request_parameters_populate_matching_properties() {
    let app = Arc::new(Application::new("beans"));
    let request = Request::new("/b.tsr")
        .with_parameter("name", "grace")
        .with_parameter("age", "")
        .with_parameter("unrelated", "x");
    let mut ctx = context(request, app);
    let (bean, _) = ctx
        .use_bean("profile", Scope::Page, BeanSource::Factory(new_profile))
        .unwrap();

    // Empty parameters and names the bean does not list are skipped.
    introspect(&mut ctx, &bean).unwrap();
    assert_eq!(
        with_bean::<Profile, _>(&bean, |p| (p.name.clone(), p.age)).unwrap(),
        ("grace".to_string(), 0)
    );

    let mut ctx = context(
        Request::new("/b.tsr").with_parameter("years", "41"),
        Arc::new(Application::new("beans")),
    );
    set_property_from_param(&mut ctx, &bean, "age", "years").unwrap();
    assert_eq!(with_bean::<Profile, _>(&bean, |p| p.age).unwrap(), 41);
}

#[test]
fn non_bean_attributes_are_property_errors() {
    let app = Arc::new(Application::new("beans"));
    let mut ctx = context(Request::new("/b.tsr"), app);
    ctx.set_attribute("plain", Value::from("text")).unwrap();
    assert!(matches!(
        find_bean(&mut ctx, "plain"),
        Err(RenderError::Property(_))
    ));
    assert!(matches!(
        handle_get_property(&mut ctx, "ghost", "name"),
        Err(RenderError::Property(_))
    ));
}
