use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use ldap_protocol::core::ber::{Element, Tag};
use ldap_protocol::protocol::dn::Dn;
use ldap_protocol::protocol::filter::{Attributes, Filter};
use ldap_protocol::protocol::matching::MatchingRules;
use ldap_protocol::protocol::router::{OperationKind, Router};
use ldap_protocol::service::handler::DefaultHandler;

fn ava(number: u32, attr: &str, value: &str) -> Element {
    Element::constructed(
        Tag::context(number, true),
        vec![Element::octet_string(attr), Element::octet_string(value)],
    )
}

/// (&(objectClass=person)(|(cn=Ali*)(mail=*@example.com))(!(uid=root)))
fn sample_filter() -> Element {
    let substrings = |attr: &str, initial: Option<&str>, final_: Option<&str>| {
        let mut parts = Vec::new();
        if let Some(s) = initial {
            parts.push(Element::primitive(Tag::context(0, false), s.as_bytes()));
        }
        if let Some(s) = final_ {
            parts.push(Element::primitive(Tag::context(2, false), s.as_bytes()));
        }
        Element::constructed(
            Tag::context(4, true),
            vec![Element::octet_string(attr), Element::sequence(parts)],
        )
    };
    Element::constructed(
        Tag::context(0, true),
        vec![
            ava(3, "objectClass", "person"),
            Element::constructed(
                Tag::context(1, true),
                vec![
                    substrings("cn", Some("Ali"), None),
                    substrings("mail", None, Some("@example.com")),
                ],
            ),
            Element::constructed(Tag::context(2, true), vec![ava(3, "uid", "root")]),
        ],
    )
}

fn sample_record() -> Attributes {
    let mut record = Attributes::new();
    record.insert("objectClass".into(), vec!["top".into(), "person".into()]);
    record.insert("cn".into(), vec!["Alice Liddell".into()]);
    record.insert("mail".into(), vec!["alice@example.com".into()]);
    record.insert("uid".into(), vec!["alice".into()]);
    record
}

fn bench_filter(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter");
    let element = sample_filter();
    let rules = MatchingRules::new();

    group.bench_function("parse", |b| {
        b.iter(|| Filter::parse(&element, Some(&rules)).unwrap())
    });

    let filter = Filter::parse(&element, Some(&rules)).unwrap();
    let record = sample_record();
    group.bench_function("evaluate", |b| b.iter(|| filter.matches(&record)));

    group.finish();
}

fn bench_dn(c: &mut Criterion) {
    let mut group = c.benchmark_group("dn");
    let input = r"cn=Lu\C4\8Di\C4\87+sn=Smith,ou=Sales\, East,o=Example,c=GB";

    group.bench_function("parse", |b| b.iter(|| Dn::parse(input).unwrap()));

    let dn = Dn::parse(input).unwrap();
    group.bench_function("render", |b| b.iter(|| dn.to_string()));

    group.finish();
}

fn bench_router(c: &mut Criterion) {
    let mut group = c.benchmark_group("router");
    let mut router = Router::new();
    for ou in ["Users", "Groups", "Services", "Devices"] {
        let pattern = format!("uid=:id,ou={ou},dc=example,dc=com");
        router
            .route(OperationKind::Bind, &pattern, Arc::new(DefaultHandler))
            .unwrap()
            .route(OperationKind::Search, &format!("ou={ou},dc=example,dc=com"), Arc::new(DefaultHandler))
            .unwrap();
    }

    let bind_dn = Dn::parse("uid=alice,ou=Services,dc=example,dc=com").unwrap();
    group.bench_function("resolve_wildcard", |b| {
        b.iter(|| router.resolve(OperationKind::Bind, &bind_dn).unwrap())
    });

    let deep = Dn::parse("cn=printer,ou=Floor3,ou=Devices,dc=example,dc=com").unwrap();
    group.bench_function("resolve_ancestor", |b| {
        b.iter(|| router.resolve(OperationKind::Search, &deep).unwrap())
    });

    group.finish();
}

criterion_group!(benches, bench_filter, bench_dn, bench_router);
criterion_main!(benches);
