use bytes::BytesMut;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use ldap_protocol::core::ber::Element;
use ldap_protocol::core::codec::LdapCodec;
use ldap_protocol::protocol::dn::Dn;
use ldap_protocol::protocol::filter::Attributes;
use ldap_protocol::protocol::message::{search_entry, LdapMessage, SearchRequest};
use tokio_util::codec::Decoder;

fn sample_search() -> Element {
    let mut request = SearchRequest::subtree(Dn::parse("ou=Users,dc=example,dc=com").unwrap());
    request.attributes = vec!["cn".into(), "mail".into(), "telephoneNumber".into()];
    LdapMessage::new(42, request.to_element()).to_element()
}

fn bench_ber_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("ber_encode");
    let search = sample_search();

    group.bench_function("search_request", |b| b.iter(|| search.to_bytes()));

    let mut attrs = Attributes::new();
    attrs.insert("cn".into(), vec!["Alice".into()]);
    attrs.insert("mail".into(), vec!["alice@example.com".into()]);
    attrs.insert("description".into(), vec!["a".repeat(1024).into_bytes()]);
    group.bench_function("search_entry", |b| {
        b.iter(|| {
            search_entry(
                "uid=alice,ou=Users,dc=example,dc=com",
                attrs.iter().map(|(k, v)| (k.as_str(), v.as_slice())),
                false,
            )
            .to_bytes()
        })
    });

    group.finish();
}

fn bench_ber_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("ber_decode");
    let bytes = sample_search().to_bytes();

    group.bench_function("element", |b| b.iter(|| Element::decode(&bytes).unwrap()));

    group.bench_function("envelope", |b| {
        b.iter(|| LdapMessage::decode(Element::decode(&bytes).unwrap()).unwrap())
    });

    let stream: Vec<u8> = (0..64).flat_map(|_| bytes.to_vec()).collect();
    group.bench_function("codec_64_frames", |b| {
        b.iter_batched(
            || BytesMut::from(&stream[..]),
            |mut buf| {
                let mut codec = LdapCodec::default();
                while let Some(frame) = codec.decode(&mut buf).unwrap() {
                    criterion::black_box(frame);
                }
            },
            BatchSize::SmallInput,
        )
    });

    group.finish();
}

criterion_group!(benches, bench_ber_encode, bench_ber_decode);
criterion_main!(benches);
