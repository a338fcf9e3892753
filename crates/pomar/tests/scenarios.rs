//! End-to-end scenarios against the in-memory mock DOM.
//!
//! Every session uses short find and wait budgets so that failures surface
//! in milliseconds.

use pomar::prelude::*;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

// ============================================================================
// Fixtures
// ============================================================================

fn session(dom: &MockDom) -> Session {
    pomar::log::init_test_tracing();
    Session::builder()
        .driver(dom.driver())
        .element_find_timeout(Duration::from_millis(50))
        .element_find_retry_interval(Duration::from_millis(5))
        .waiting_timeout(Duration::from_millis(50))
        .waiting_retry_interval(Duration::from_millis(5))
        .build()
        .unwrap()
}

struct SignInPage {
    email: Control<TextInput>,
    agree: Control<CheckBox>,
    remember: Control<CheckBox>,
    sign_in: Control<Button>,
    ghost: Control<Button>,
}

impl PageObject for SignInPage {
    fn url() -> Option<&'static str> {
        Some("/signin")
    }

    fn declare(page: &mut PageBuilder<'_>) -> PomarResult<Self> {
        Ok(Self {
            email: page.find(
                "email",
                [TriggerAttribute::log_info("leaving sign in")
                    .with_on(TriggerEvents::DE_INIT)
                    .into()],
            )?,
            agree: page.find(
                "agreeCheckbox",
                [
                    FindAttribute::id("agree").into(),
                    TriggerAttribute::log_info("agree initialized").into(),
                ],
            )?,
            remember: page.find("remember", [CacheAttribute::scope().into()])?,
            sign_in: page.find("signIn", [TriggerAttribute::screenshot(Some("sign in")).into()])?,
            ghost: page.find("ghost", [FindAttribute::id("ghost").into()])?,
        })
    }
}

struct SignInDom {
    dom: MockDom,
    agree: usize,
    remember: usize,
    sign_in: usize,
}

fn sign_in_dom() -> SignInDom {
    let dom = MockDom::new();
    let _ = dom.add(MockElement::new("input").with_attribute("type", "text").with_id("email"));
    let agree = dom.add(MockElement::checkbox("agree"));
    let remember = dom.add(MockElement::checkbox("remember"));
    let sign_in = dom.add(MockElement::new("button").with_text("Sign In"));
    SignInDom {
        dom,
        agree,
        remember,
        sign_in,
    }
}

struct SaveButton;

impl ComponentKind for SaveButton {
    const TYPE_NAME: &'static str = "button";

    fn definition() -> ElementDefinition {
        ElementDefinition::of(ElementPattern::tag("button"))
    }

    fn attributes() -> Vec<Attribute> {
        vec![TriggerAttribute::log_info("declared on type")
            .with_on(TriggerEvents::BEFORE_CLICK)
            .into()]
    }
}

struct ToolbarPage {
    toolbar: Control<Container>,
    save: Control<SaveButton>,
}

impl PageObject for ToolbarPage {
    fn declare(page: &mut PageBuilder<'_>) -> PomarResult<Self> {
        let toolbar: Control<Container> = page.find("toolbar", [])?;
        let save = page.find_in(toolbar.id(), "save", [])?;
        Ok(Self { toolbar, save })
    }
}

struct OptionsPage {
    options: ControlList<CheckBox>,
}

impl PageObject for OptionsPage {
    fn declare(page: &mut PageBuilder<'_>) -> PomarResult<Self> {
        Ok(Self {
            options: page.find_all("options", [])?,
        })
    }
}

struct CachedOptionsPage {
    options: ControlList<CheckBox>,
}

impl PageObject for CachedOptionsPage {
    fn declare(page: &mut PageBuilder<'_>) -> PomarResult<Self> {
        Ok(Self {
            options: page.find_all(
                "options",
                [CacheAttribute::scope()
                    .with_target(CacheTarget::SelfAndChildren)
                    .into()],
            )?,
        })
    }
}

fn options_dom(count: usize) -> (MockDom, Vec<usize>) {
    let dom = MockDom::new();
    let indices = (1..=count)
        .map(|n| {
            let class = if n % 2 == 1 { "option odd" } else { "option" };
            dom.add(MockElement::checkbox(format!("option-{n}")).with_attribute("class", class))
        })
        .collect();
    (dom, indices)
}

// ============================================================================
// Declaration and naming
// ============================================================================

#[test]
fn declaring_a_page_performs_no_lookups() {
    let fixture = sign_in_dom();
    let mut s = session(&fixture.dom);
    fixture.dom.reset_find_count();
    let _page = s.on::<SignInPage>().unwrap();
    assert_eq!(fixture.dom.find_count(), 0);
}

#[test]
fn full_names_follow_the_tree() {
    let fixture = sign_in_dom();
    let mut s = session(&fixture.dom);
    let page = s.on::<SignInPage>().unwrap();
    assert_eq!(
        page.agree.full_name(&s).unwrap(),
        "\"Sign In\" page / \"Agree\" checkbox"
    );
    assert_eq!(page.sign_in.name(&s).unwrap(), "Sign In");
    assert_eq!(page.email.name(&s).unwrap(), "Email");
}

#[test]
fn nested_controls_search_inside_their_parent() {
    let dom = MockDom::new();
    let outside = dom.add(MockElement::new("button").with_id("save"));
    let toolbar = dom.add(MockElement::new("div").with_id("toolbar"));
    let inside = dom.add_child(toolbar, MockElement::new("button").with_id("save"));
    let mut s = session(&dom);
    let page = s.on::<ToolbarPage>().unwrap();

    page.save.click(&mut s).unwrap();
    assert_eq!(dom.clicks(inside), 1);
    assert_eq!(dom.clicks(outside), 0);

    assert_eq!(page.save.parent(&s).unwrap(), Some(page.toolbar.id()));
    assert_eq!(
        page.save.get_ancestor::<Container>(&s).unwrap(),
        Some(page.toolbar)
    );
    assert_eq!(
        page.save.full_name(&s).unwrap(),
        "\"Toolbar\" page / \"Toolbar\" control / \"Save\" button"
    );
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn init_fires_once() {
    let fixture = sign_in_dom();
    let mut s = session(&fixture.dom);
    let page = s.on::<SignInPage>().unwrap();
    let init_sections = |s: &Session| {
        s.log()
            .count_sections(LogSectionKind::ExecuteTrigger, "LogInfo trigger on Init against")
    };
    assert_eq!(init_sections(&s), 1);

    s.init_component(page.id()).unwrap();
    s.init_component(page.agree.id()).unwrap();
    assert_eq!(init_sections(&s), 1);
}

#[test]
fn controls_declared_later_are_initialized_at_once() {
    let fixture = sign_in_dom();
    let mut s = session(&fixture.dom);
    let page = s.on::<ToolbarPage>().unwrap();
    let extra: Control<Button> = page
        .toolbar
        .find(&mut s, "extra", [TriggerAttribute::log_info("extra ready").into()])
        .unwrap();
    assert_eq!(
        s.log()
            .count_sections(LogSectionKind::ExecuteTrigger, "LogInfo trigger on Init against"),
        1
    );
    assert!(s.log().entries().any(|e| e.message == "extra ready"));
    assert_eq!(s.parent_of(extra.id()).unwrap(), Some(page.toolbar.id()));
}

#[test]
fn navigating_away_cleans_up_the_previous_page() {
    let fixture = sign_in_dom();
    let mut s = Session::builder()
        .driver(fixture.dom.driver())
        .base_url("https://demo.example.com/")
        .unwrap()
        .build()
        .unwrap();
    let sign_in = s.go_to::<SignInPage>().unwrap();
    assert_eq!(fixture.dom.url(), "https://demo.example.com/signin");
    assert!(sign_in.is_current(&mut s).unwrap());
    assert_eq!(s.component_count(), 6);

    let toolbar = s.on::<ToolbarPage>().unwrap();
    assert_eq!(
        s.log()
            .count_sections(LogSectionKind::ExecuteTrigger, "LogInfo trigger on DeInit"),
        1
    );
    assert!(s.log().entries().any(|e| e.message == "leaving sign in"));
    assert_eq!(s.component_count(), 3);
    assert!(sign_in.agree.full_name(&s).is_err());
    assert_eq!(s.active_page(), Some(toolbar.id()));
}

// ============================================================================
// Triggers
// ============================================================================

#[test]
fn trigger_does_not_re_enter_its_own_event() {
    let fixture = sign_in_dom();
    let mut s = session(&fixture.dom);
    let page = s.on::<SignInPage>().unwrap();
    let button = page.sign_in;
    button
        .push(
            &mut s,
            TriggerAttribute::from_fn("Reclick", TriggerEvents::BEFORE_CLICK, move |ctx| {
                button.click(ctx.session())
            }),
        )
        .unwrap();

    button.click(&mut s).unwrap();
    assert_eq!(fixture.dom.clicks(fixture.sign_in), 2);
    assert_eq!(
        s.log().count_sections(LogSectionKind::ExecuteTrigger, "Reclick"),
        1
    );

    button.click(&mut s).unwrap();
    assert_eq!(
        s.log().count_sections(LogSectionKind::ExecuteTrigger, "Reclick"),
        2
    );
    assert_eq!(s.log().depth(), 0);
}

#[test]
fn failed_trigger_aborts_the_action_and_releases_the_guard() {
    let fixture = sign_in_dom();
    let mut s = session(&fixture.dom);
    let page = s.on::<SignInPage>().unwrap();
    let failures = Rc::new(RefCell::new(1));
    let remaining = Rc::clone(&failures);
    page.sign_in
        .push(
            &mut s,
            TriggerAttribute::from_fn("Flaky", TriggerEvents::BEFORE_CLICK, move |_| {
                let mut left = remaining.borrow_mut();
                if *left > 0 {
                    *left -= 1;
                    return Err(PomarError::invalid_state("not ready"));
                }
                Ok(())
            }),
        )
        .unwrap();

    let err = page.sign_in.click(&mut s).unwrap_err();
    assert!(matches!(err, PomarError::TriggerFailed { .. }));
    assert!(matches!(err.root_cause(), PomarError::InvalidState { .. }));
    assert!(err.to_string().contains("\"Sign In\" page / \"Sign In\" button"));
    assert_eq!(fixture.dom.clicks(fixture.sign_in), 0);

    page.sign_in.click(&mut s).unwrap();
    assert_eq!(fixture.dom.clicks(fixture.sign_in), 1);
    assert_eq!(*failures.borrow(), 0);
}

#[test]
fn pushed_trigger_overrides_type_declaration() {
    let dom = MockDom::new();
    let toolbar = dom.add(MockElement::new("div").with_id("toolbar"));
    let _ = dom.add_child(toolbar, MockElement::new("button").with_id("save"));
    let mut s = session(&dom);
    let page = s.on::<ToolbarPage>().unwrap();
    let messages = |s: &Session, text: &str| s.log().entries().filter(|e| e.message == text).count();

    page.save.click(&mut s).unwrap();
    assert_eq!(messages(&s, "declared on type"), 1);

    page.save
        .push(
            &mut s,
            TriggerAttribute::log_info("pushed").with_on(TriggerEvents::BEFORE_CLICK),
        )
        .unwrap();
    let triggers = s.metadata(page.save.id()).unwrap().get_all::<TriggerAttribute>().len();
    assert_eq!(triggers, 1);

    page.save.click(&mut s).unwrap();
    assert_eq!(messages(&s, "declared on type"), 1);
    assert_eq!(messages(&s, "pushed"), 1);
}

#[test]
fn screenshot_is_taken_before_click() {
    let fixture = sign_in_dom();
    fixture.dom.set_screenshot(vec![0x89, b'P', b'N', b'G']);
    let shots = MemoryScreenshotConsumer::new();
    let mut s = Session::builder()
        .driver(fixture.dom.driver())
        .screenshot_consumer(shots.clone())
        .build()
        .unwrap();
    let page = s.on::<SignInPage>().unwrap();

    page.sign_in.click(&mut s).unwrap();
    let taken = shots.shots();
    assert_eq!(taken.len(), 1);
    assert_eq!(taken[0].file_name(), "01 - Sign In - sign in.png");
    assert!(fixture.dom.was_called("screenshot"));
}

#[test]
fn global_attributes_reach_every_control() {
    let fixture = sign_in_dom();
    let mut s = Session::builder()
        .driver(fixture.dom.driver())
        .global_attribute(MulticastAttribute::new(Attribute::from(
            TriggerAttribute::log_info("global hello").with_on(TriggerEvents::BEFORE_CLICK),
        )))
        .build()
        .unwrap();
    let page = s.on::<SignInPage>().unwrap();
    page.sign_in.click(&mut s).unwrap();
    assert!(s.log().entries().any(|e| e.message == "global hello"));
}

// ============================================================================
// Values and caching
// ============================================================================

#[test]
fn checking_twice_clicks_once() {
    let fixture = sign_in_dom();
    let mut s = session(&fixture.dom);
    let page = s.on::<SignInPage>().unwrap();
    let events = Rc::new(RefCell::new(Vec::new()));
    let seen = Rc::clone(&events);
    page.agree
        .push(
            &mut s,
            TriggerAttribute::from_fn(
                "Record",
                TriggerEvents::BEFORE_SET | TriggerEvents::AFTER_SET,
                move |ctx| {
                    seen.borrow_mut().push(ctx.event().to_string());
                    Ok(())
                },
            ),
        )
        .unwrap();

    assert!(!page.agree.is_checked(&mut s).unwrap());
    page.agree.check(&mut s).unwrap();
    assert!(page.agree.is_checked(&mut s).unwrap());
    page.agree.check(&mut s).unwrap();

    assert_eq!(fixture.dom.clicks(fixture.agree), 1);
    assert_eq!(
        *events.borrow(),
        vec!["BeforeSet", "AfterSet", "BeforeSet", "AfterSet"]
    );

    page.agree.uncheck(&mut s).unwrap();
    assert_eq!(fixture.dom.clicks(fixture.agree), 2);
    assert!(!fixture.dom.is_selected(fixture.agree));
}

#[test]
fn text_input_set_and_append() {
    let fixture = sign_in_dom();
    let mut s = session(&fixture.dom);
    let page = s.on::<SignInPage>().unwrap();
    page.email.set(&mut s, &"admin".to_string()).unwrap();
    assert_eq!(page.email.get(&mut s).unwrap(), "admin");
    page.email.append(&mut s, "@example.com").unwrap();
    assert_eq!(page.email.get(&mut s).unwrap(), "admin@example.com");
}

#[test]
fn clear_cache_re_resolves_the_scope() {
    let fixture = sign_in_dom();
    let mut s = session(&fixture.dom);
    let page = s.on::<SignInPage>().unwrap();

    fixture.dom.reset_find_count();
    let _ = page.remember.is_checked(&mut s).unwrap();
    let _ = page.remember.is_checked(&mut s).unwrap();
    assert_eq!(fixture.dom.find_count(), 1);

    page.clear_cache(&mut s).unwrap();
    let _ = page.remember.is_checked(&mut s).unwrap();
    assert_eq!(fixture.dom.find_count(), 2);

    fixture.dom.reset_find_count();
    let _ = page.agree.is_checked(&mut s).unwrap();
    let _ = page.agree.is_checked(&mut s).unwrap();
    assert_eq!(fixture.dom.find_count(), 2);
}

#[test]
fn stale_cached_scope_is_recovered() {
    let fixture = sign_in_dom();
    let mut s = session(&fixture.dom);
    let page = s.on::<SignInPage>().unwrap();
    assert!(!page.remember.is_checked(&mut s).unwrap());

    fixture.dom.make_stale(fixture.remember);
    page.remember.check(&mut s).unwrap();
    assert_eq!(fixture.dom.clicks(fixture.remember), 1);
    assert!(page.remember.is_checked(&mut s).unwrap());
}

// ============================================================================
// Lookups and waits
// ============================================================================

#[test]
fn safe_lookup_is_absent_and_unsafe_lookup_names_the_control() {
    let fixture = sign_in_dom();
    let mut s = session(&fixture.dom);
    let page = s.on::<SignInPage>().unwrap();

    assert!(!page.ghost.is_present(&mut s).unwrap());
    assert_eq!(
        s.get_scope(page.ghost.id(), &SearchOptions::safely_at_once()).unwrap(),
        None
    );

    match page.ghost.click(&mut s).unwrap_err() {
        PomarError::NotFound { component, .. } => {
            assert_eq!(component, "\"Sign In\" page / \"Ghost\" button");
        }
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[test]
fn unsafe_missing_check_fails_for_a_present_control() {
    let fixture = sign_in_dom();
    let mut s = session(&fixture.dom);
    let page = s.on::<SignInPage>().unwrap();

    assert!(!page.sign_in.missing(&mut s, &SearchOptions::safely_at_once()).unwrap());
    match page.sign_in.missing(&mut s, &SearchOptions::at_once()).unwrap_err() {
        PomarError::UnexpectedlyPresent { component, .. } => {
            assert_eq!(component, "\"Sign In\" page / \"Sign In\" button");
        }
        other => panic!("expected UnexpectedlyPresent, got {other:?}"),
    }
    assert!(page.ghost.missing(&mut s, &SearchOptions::at_once()).unwrap());
}

#[test]
fn unsafe_missing_check_fails_for_a_matching_predicate_item() {
    let (dom, _) = options_dom(3);
    let mut s = session(&dom);
    let page = s.on::<OptionsPage>().unwrap();
    let checked = page
        .options
        .find(&mut s, "checked", |s, item| item.is_checked(s))
        .unwrap();
    assert!(checked.missing(&mut s, &SearchOptions::at_once()).unwrap());

    page.options.get(&mut s, 1).unwrap().check(&mut s).unwrap();
    assert!(!checked.missing(&mut s, &SearchOptions::safely_at_once()).unwrap());
    match checked.missing(&mut s, &SearchOptions::at_once()).unwrap_err() {
        PomarError::UnexpectedlyPresent { component, .. } => {
            assert_eq!(
                component,
                "\"Options\" page / \"Options\" list / \"checked\" checkbox"
            );
        }
        other => panic!("expected UnexpectedlyPresent, got {other:?}"),
    }
}

#[test]
fn zero_timeout_wait_probes_once() {
    let fixture = sign_in_dom();
    let mut s = session(&fixture.dom);
    let page = s.on::<SignInPage>().unwrap();
    let at_once = WaitOptions::new().with_timeout(Duration::ZERO);

    fixture.dom.reset_find_count();
    let err = page.ghost.wait(&mut s, Until::Present, at_once).unwrap_err();
    assert_eq!(fixture.dom.find_count(), 1);
    match err {
        PomarError::Timeout { ms, last_state, .. } => {
            assert_eq!(ms, 0);
            assert_eq!(last_state, "missing");
        }
        other => panic!("expected Timeout, got {other:?}"),
    }

    assert!(!page.ghost.wait(&mut s, Until::Present, at_once.without_throwing()).unwrap());
    assert!(page.ghost.wait(&mut s, Until::Missing, at_once).unwrap());
    assert!(page.sign_in.wait(&mut s, Until::Visible, at_once).unwrap());
}

#[test]
fn wait_sees_an_element_disappear() {
    let fixture = sign_in_dom();
    let mut s = session(&fixture.dom);
    let page = s.on::<SignInPage>().unwrap();
    assert!(page.sign_in.is_visible(&mut s).unwrap());

    fixture.dom.set_displayed(fixture.sign_in, false);
    assert!(page.sign_in.wait(&mut s, Until::Hidden, WaitOptions::new()).unwrap());
    assert!(!page.sign_in.is_visible(&mut s).unwrap());

    fixture.dom.remove(fixture.sign_in);
    assert!(page.sign_in.wait(&mut s, Until::Missing, WaitOptions::new()).unwrap());
}

// ============================================================================
// Lists
// ============================================================================

#[test]
fn predicate_item_exists_only_once_an_item_matches() {
    let (dom, _) = options_dom(12);
    let mut s = session(&dom);
    let page = s.on::<OptionsPage>().unwrap();

    assert_eq!(page.options.count(&mut s).unwrap(), 12);
    let checked = page
        .options
        .find(&mut s, "checked", |s, item| item.is_checked(s))
        .unwrap();
    assert!(!checked.is_present(&mut s).unwrap());
    assert_eq!(page.options.index_of(&mut s, |s, item| item.is_checked(s)).unwrap(), None);

    page.options.get(&mut s, 1).unwrap().check(&mut s).unwrap();
    assert!(checked.is_present(&mut s).unwrap());
    assert_eq!(checked.attribute(&mut s, "id").unwrap().as_deref(), Some("option-2"));
    assert_eq!(
        page.options.index_of(&mut s, |s, item| item.is_checked(s)).unwrap(),
        Some(1)
    );
}

#[test]
fn list_items_are_named_by_position() {
    let (dom, _) = options_dom(3);
    let mut s = session(&dom);
    let page = s.on::<OptionsPage>().unwrap();
    let second = page.options.get(&mut s, 1).unwrap();
    assert_eq!(
        second.full_name(&s).unwrap(),
        "\"Options\" page / \"Options\" list / \"2nd\" checkbox"
    );
    assert_eq!(
        page.options.full_name(&s).unwrap(),
        "\"Options\" page / \"Options\" list"
    );
    assert!(page.options.get(&mut s, 5).unwrap().is_checked(&mut s).is_err());
}

#[test]
fn cached_list_reuses_items_and_elements() {
    let (dom, _) = options_dom(4);
    let mut s = session(&dom);
    let page = s.on::<CachedOptionsPage>().unwrap();

    dom.reset_find_count();
    assert_eq!(page.options.count(&mut s).unwrap(), 4);
    assert_eq!(page.options.count(&mut s).unwrap(), 4);
    assert_eq!(dom.find_count(), 1);

    let first = page.options.get(&mut s, 2).unwrap();
    let again = page.options.get(&mut s, 2).unwrap();
    assert_eq!(first, again);
    let _ = first.is_checked(&mut s).unwrap();
    let _ = again.is_checked(&mut s).unwrap();
    assert_eq!(dom.find_count(), 1);

    page.options.clear_cache(&mut s).unwrap();
    let fresh = page.options.get(&mut s, 2).unwrap();
    assert_ne!(fresh, first);
    let _ = fresh.is_checked(&mut s).unwrap();
    assert_eq!(dom.find_count(), 2);
}

#[test]
fn uncached_list_looks_up_on_every_access() {
    let (dom, _) = options_dom(4);
    let mut s = session(&dom);
    let page = s.on::<OptionsPage>().unwrap();

    dom.reset_find_count();
    let first = page.options.get(&mut s, 2).unwrap();
    let again = page.options.get(&mut s, 2).unwrap();
    assert_ne!(first, again);
    let _ = first.is_checked(&mut s).unwrap();
    let _ = again.is_checked(&mut s).unwrap();
    assert_eq!(dom.find_count(), 2);
}

#[test]
fn cached_list_reuses_predicate_and_xpath_items() {
    let (dom, indices) = options_dom(4);
    dom.set_selected(indices[2], true);
    let mut s = session(&dom);
    let page = s.on::<CachedOptionsPage>().unwrap();

    dom.reset_find_count();
    let checked = page.options.find(&mut s, "checked", |s, item| item.is_checked(s)).unwrap();
    let again = page.options.find(&mut s, "checked", |s, item| item.is_checked(s)).unwrap();
    assert_eq!(checked, again);
    assert_eq!(dom.find_count(), 0);
    assert_eq!(checked.attribute(&mut s, "id").unwrap().as_deref(), Some("option-3"));
    assert_eq!(again.attribute(&mut s, "id").unwrap().as_deref(), Some("option-3"));
    assert_eq!(dom.find_count(), 1);

    dom.reset_find_count();
    let third = page.options.get_by_xpath_condition(&mut s, "Third", "@id='option-3'").unwrap();
    let same = page.options.get_by_xpath_condition(&mut s, "Third", "@id='option-3'").unwrap();
    assert_eq!(third, same);
    assert!(third.is_checked(&mut s).unwrap());
    assert!(same.is_checked(&mut s).unwrap());
    assert_eq!(dom.find_count(), 1);

    page.options.clear_cache(&mut s).unwrap();
    let fresh = page.options.get_by_xpath_condition(&mut s, "Third", "@id='option-3'").unwrap();
    assert_ne!(fresh, third);
    assert!(fresh.is_checked(&mut s).unwrap());
    assert_eq!(dom.find_count(), 2);
}

#[test]
fn uncached_list_repeats_predicate_and_xpath_lookups() {
    let (dom, indices) = options_dom(4);
    dom.set_selected(indices[2], true);
    let mut s = session(&dom);
    let page = s.on::<OptionsPage>().unwrap();

    dom.reset_find_count();
    let checked = page.options.find(&mut s, "checked", |s, item| item.is_checked(s)).unwrap();
    let again = page.options.find(&mut s, "checked", |s, item| item.is_checked(s)).unwrap();
    assert_ne!(checked, again);
    assert_eq!(checked.attribute(&mut s, "id").unwrap().as_deref(), Some("option-3"));
    assert_eq!(again.attribute(&mut s, "id").unwrap().as_deref(), Some("option-3"));
    assert_eq!(dom.find_count(), 2);

    dom.reset_find_count();
    let third = page.options.get_by_xpath_condition(&mut s, "Third", "@id='option-3'").unwrap();
    let same = page.options.get_by_xpath_condition(&mut s, "Third", "@id='option-3'").unwrap();
    assert_ne!(third, same);
    assert!(third.is_checked(&mut s).unwrap());
    assert!(same.is_checked(&mut s).unwrap());
    assert_eq!(dom.find_count(), 2);
}

#[test]
fn uncached_items_stay_out_of_the_page_tree() {
    let (dom, _) = options_dom(3);
    let mut s = session(&dom);
    let page = s.on::<OptionsPage>().unwrap();
    let before = s.component_count();

    let held = page.options.get(&mut s, 0).unwrap();
    for _ in 0..100 {
        assert!(!page.options.get(&mut s, 0).unwrap().is_checked(&mut s).unwrap());
    }
    let checked = page.options.find(&mut s, "checked", |s, item| item.is_checked(s)).unwrap();
    for _ in 0..3 {
        assert!(!checked.is_present(&mut s).unwrap());
    }

    assert!(s.children_of(page.id()).unwrap().is_empty());
    assert_eq!(s.component_count(), before + 102);
    assert!(!held.is_checked(&mut s).unwrap());

    dom.reset_find_count();
    page.clear_cache(&mut s).unwrap();
    assert_eq!(dom.find_count(), 0);
    assert_eq!(s.component_count(), before);
    assert!(matches!(
        held.is_checked(&mut s),
        Err(PomarError::InvalidState { .. })
    ));
}

#[test]
fn xpath_conditions_select_items() {
    let (dom, _) = options_dom(5);
    let mut s = session(&dom);
    let page = s.on::<OptionsPage>().unwrap();

    let third = page
        .options
        .get_by_xpath_condition(&mut s, "Third", "@id='option-3'")
        .unwrap();
    assert_eq!(third.attribute(&mut s, "id").unwrap().as_deref(), Some("option-3"));
    assert_eq!(third.name(&s).unwrap(), "Third");

    let odd = page
        .options
        .get_all_by_xpath_condition(&mut s, "odd", "contains(@class,'odd')")
        .unwrap();
    assert_eq!(odd.len(), 3);
    assert_eq!(odd[2].name(&s).unwrap(), "3rd odd");
    assert_eq!(odd[2].attribute(&mut s, "id").unwrap().as_deref(), Some("option-5"));
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn yaml_configuration_drives_the_session() {
    let config = PomarConfig::from_yaml_str(
        "base_url: https://demo.example.com/app/\nelement_find_timeout_ms: 20\nelement_find_retry_interval_ms: 5\n",
    )
    .unwrap();
    let fixture = sign_in_dom();
    let mut s = Session::builder()
        .config(config)
        .driver(fixture.dom.driver())
        .build()
        .unwrap();
    assert_eq!(s.config().element_find().timeout, Duration::from_millis(20));

    let _page = s.go_to_url::<SignInPage>("login").unwrap();
    assert_eq!(fixture.dom.url(), "https://demo.example.com/app/login");
}

#[test]
fn invalid_configuration_fails_before_any_driver_call() {
    let dom = MockDom::new();
    let err = Session::builder()
        .driver(dom.driver())
        .element_find_retry_interval(Duration::ZERO)
        .build()
        .unwrap_err();
    assert!(matches!(err, PomarError::Configuration { .. }));
    assert!(dom.history().is_empty());
}
