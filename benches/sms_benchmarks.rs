// ABOUTME: Benchmark suite for the SMS modem library
// ABOUTME: Measures PDU decoding, AT command building, event binding and session parsing

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use sms_modem::at::{self, AtCommand, Mode, Param};
use sms_modem::bus::{EventParam, bind};
use sms_modem::event::{Event, EventKind};
use sms_modem::pdu::{self, PduCodec};
use sms_modem::sms::{SmsConfig, SmsSession};
use std::sync::Arc;
use std::time::Duration;

const UCS2_PDU: &str = "07915892206747F7040D91181154419181F0000852900341933540046D4B8BD5";
const GSM7_PDU: &str = "00040B911316325476F80000993092516195800AE8329BFD4697D9EC37";
const LATIN1_PDU: &str = "0004048121430004993092516195800548656C6C6F";

fn bench_pdu_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("pdu_decode");
    group.measurement_time(Duration::from_secs(10));

    for (name, sample) in [("ucs2", UCS2_PDU), ("gsm7", GSM7_PDU), ("latin1", LATIN1_PDU)] {
        group.bench_with_input(BenchmarkId::from_parameter(name), sample, |b, sample| {
            b.iter(|| pdu::decode(black_box(sample)).unwrap())
        });
    }

    group.finish();
}

fn bench_at_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("at_build");

    group.bench_function("build_set", |b| {
        let params = [Param::from(3), Param::from(0)];
        b.iter(|| at::build(black_box("+CMGD"), black_box(&params), "set").unwrap())
    });

    group.bench_function("builder_to_bytes", |b| {
        b.iter(|| {
            AtCommand::new(black_box("+CMGR"))
                .mode(Mode::Set)
                .param(7)
                .terminator("\r")
                .to_bytes()
        })
    });

    group.bench_function("parse_expect", |b| {
        b.iter(|| at::parse_expect(black_box("+CMTI: \"ME\",3"), "+CMTI").unwrap())
    });

    group.finish();
}

fn bench_bind(c: &mut Criterion) {
    let mut group = c.benchmark_group("bind");

    let params = [
        EventParam::required("rx", EventKind::DataReceived),
        EventParam::optional("log", EventKind::Log),
    ];

    for batch in [1usize, 4, 16] {
        let events: Vec<Arc<Event>> = (0..batch)
            .map(|i| Arc::new(Event::data_received(format!("COM{i}"), &b"OK\r\n"[..])))
            .collect();

        group.bench_with_input(BenchmarkId::new("data_received", batch), &events, |b, events| {
            b.iter(|| bind(black_box(&params), black_box(events)))
        });
    }

    group.finish();
}

fn bench_session(c: &mut Criterion) {
    let mut group = c.benchmark_group("session");

    let dialogue = format!("+CMTI: \"ME\",3\r\n+CMGR: 0,,24\r\n{UCS2_PDU}\r\nOK\r\n");

    group.bench_function("notification_to_delivery", |b| {
        b.iter(|| {
            let mut session = SmsSession::new(SmsConfig::default(), PduCodec);
            session.feed(black_box(dialogue.as_bytes()))
        })
    });

    group.finish();
}

criterion_group!(benches, bench_pdu_decode, bench_at_build, bench_bind, bench_session);
criterion_main!(benches);
