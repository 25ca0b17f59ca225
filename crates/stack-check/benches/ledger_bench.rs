// Borrow ledger and whole-stream verification throughput.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use stack_check::ledger::{Ledger, NewBorrow, SlotSet};
use stack_check::parser::parse;
use stack_check::registry::ContainerId;
use stack_check::scope::ScopeId;
use stack_check::token::Pos;
use stack_check::{Verifier, VerifyOptions};
use stack_val::{BorrowMode, Extent};

fn read_borrow(lo: usize) -> NewBorrow {
    NewBorrow {
        container: ContainerId(0),
        extent: Extent::range(lo as i64, lo as i64),
        slots: SlotSet::singleton(lo),
        mode: BorrowMode::ReadOnly,
        scope: ScopeId::GLOBAL,
        holder: None,
        pos: Pos::default(),
    }
}

/// A ledger with one read borrow on every even position of a 1024-slot container.
fn crowded_ledger() -> Ledger {
    let mut ledger = Ledger::new();
    for lo in (0..1024).step_by(2) {
        let _ = ledger.borrow(read_borrow(lo), None);
    }
    ledger
}

fn bench_ledger(c: &mut Criterion) {
    let ledger = crowded_ledger();
    let odd: SlotSet = SlotSet::from_positions(&(1..1024).step_by(2).collect::<Vec<_>>());
    let all = SlotSet::range(0, 1023);

    c.bench_function("check_write_disjoint", |b| {
        b.iter(|| ledger.check_write(ContainerId(0), black_box(&odd), None))
    });
    c.bench_function("check_write_conflict", |b| {
        b.iter(|| ledger.check_write(ContainerId(0), black_box(&all), None))
    });
    c.bench_function("check_read_under_reads", |b| {
        b.iter(|| ledger.check_read(ContainerId(0), black_box(&all), None))
    });
    c.bench_function("borrow_and_release_scope", |b| {
        b.iter(|| {
            let mut ledger = Ledger::new();
            for lo in 0..256 {
                let _ = ledger.borrow(read_borrow(lo), None);
            }
            ledger.release_scope(ScopeId::GLOBAL)
        })
    });
}

fn stream(blocks: usize) -> String {
    let mut code = String::from("declare X: int owned\nbind x = X\n");
    for i in 0..blocks {
        code.push_str(&format!(
            "push x {i}\npush x {i}\n{{\n    borrow r = x [0..{i}] read\n    peek r [0..0]\n    borrow w = x [{hi}..{hi}] mut\n    pop w\n}}\n",
            i = i,
            hi = i + 1
        ));
    }
    code
}

fn bench_verify(c: &mut Criterion) {
    let ops = parse(&stream(500), 0).unwrap_or_default();
    c.bench_function("verify_500_blocks", |b| {
        b.iter(|| Verifier::verify(black_box(&ops), VerifyOptions::default()))
    });
    let code = stream(500);
    c.bench_function("parse_500_blocks", |b| b.iter(|| parse(black_box(&code), 0)));
}

criterion_group!(benches, bench_ledger, bench_verify);
criterion_main!(benches);
