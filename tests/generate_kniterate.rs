use courser::{BackendKind, Bed, Dir, EmittedOp, GenerateOpts, InMemorySink, Needle, Pattern, Yarn};

fn ten_needle_swatch() -> Pattern {
    let cotton = Yarn::new("cotton").unwrap();
    let mut p = Pattern::new();
    for _ in 0..3 {
        p.new_course(&[&cotton], 0).unwrap();
        p.insert(&[&cotton], "k", 10).unwrap();
    }
    p.map_yarn(&cotton, 2, true, None);
    p
}

fn compile(p: &Pattern, opts: &GenerateOpts) -> (Vec<EmittedOp>, courser::GenerateReport) {
    let mut sink = InMemorySink::new();
    let report = p.generate(&mut sink, opts).unwrap();
    (sink.into_ops(), report)
}

#[test]
fn hookless_machine_runs_a_plain_carrier_lifecycle() {
    let p = ten_needle_swatch();
    let (ops, report) = compile(&p, &GenerateOpts::for_backend(BackendKind::Kniterate));
    assert_eq!(report.courses, 3);
    assert!(report.warnings.is_empty(), "got {:?}", report.warnings);

    assert!(!ops.iter().any(|op| matches!(
        op,
        EmittedOp::Inhook { .. } | EmittedOp::Releasehook { .. } | EmittedOp::Outhook { .. }
    )));
    let ins: Vec<&EmittedOp> = ops
        .iter()
        .filter(|op| matches!(op, EmittedOp::In { .. } | EmittedOp::Out { .. }))
        .collect();
    assert_eq!(ins, vec![&EmittedOp::In { carrier: 2 }, &EmittedOp::Out { carrier: 2 }]);
}

#[test]
fn anchor_tucks_stride_the_back_bed_and_release_in_order() {
    let p = ten_needle_swatch();
    let (ops, _) = compile(&p, &GenerateOpts::for_backend(BackendKind::Kniterate));

    // The bring-in walks leftward from the right edge at the anchor stride.
    let tucks: Vec<(Bed, i32)> = ops
        .iter()
        .filter_map(|op| match op {
            EmittedOp::Tuck { needle, .. } => Some((needle.bed, needle.index)),
            _ => None,
        })
        .collect();
    assert_eq!(tucks, vec![(Bed::Back, 10), (Bed::Back, 5)]);

    // Release walks back up once the first course holds the fabric.
    let drops: Vec<Needle> = ops
        .iter()
        .filter_map(|op| match op {
            EmittedOp::Drop { needle } => Some(*needle),
            _ => None,
        })
        .collect();
    assert_eq!(drops[0], Needle::hook(Bed::Back, 5));
    assert_eq!(drops[1], Needle::hook(Bed::Back, 10));
}

#[test]
fn cast_on_splits_parity_then_straightens() {
    let p = ten_needle_swatch();
    let (ops, _) = compile(&p, &GenerateOpts::for_backend(BackendKind::Kniterate));

    let knits: Vec<(Dir, i32)> = ops
        .iter()
        .filter_map(|op| match op {
            EmittedOp::Knit { dir, needle, carriers } if !carriers.is_empty() => {
                assert_eq!(needle.bed, Bed::Front);
                Some((*dir, needle.index))
            }
            _ => None,
        })
        .collect();
    let parity = [
        (Dir::Right, 1),
        (Dir::Right, 3),
        (Dir::Right, 5),
        (Dir::Right, 7),
        (Dir::Right, 9),
        (Dir::Left, 10),
        (Dir::Left, 8),
        (Dir::Left, 6),
        (Dir::Left, 4),
        (Dir::Left, 2),
    ];
    assert_eq!(&knits[..10], &parity);

    // Every needle bounces to the opposite bed and back to even the loops out.
    let xfers: Vec<(Needle, Needle)> = ops
        .iter()
        .filter_map(|op| match op {
            EmittedOp::Xfer { src, dst } => Some((*src, *dst)),
            _ => None,
        })
        .collect();
    for n in 1..=10 {
        let i = 2 * (n as usize - 1);
        assert_eq!(xfers[i], (Needle::hook(Bed::Front, n), Needle::hook(Bed::Back, n)));
        assert_eq!(xfers[i + 1], (Needle::hook(Bed::Back, n), Needle::hook(Bed::Front, n)));
    }
}

#[test]
fn carrier_leaves_before_the_terminal_loop_drops() {
    let p = ten_needle_swatch();
    let (ops, _) = compile(&p, &GenerateOpts::for_backend(BackendKind::Kniterate));

    let out = ops
        .iter()
        .position(|op| matches!(op, EmittedOp::Out { .. }))
        .unwrap();
    // The third course ends at the right edge, so the bind-off walks left
    // and finishes on needle 1.
    assert_eq!(ops[out + 1], EmittedOp::Drop { needle: Needle::hook(Bed::Front, 1) });
}

#[test]
fn half_gauge_emits_odd_needles_only() {
    let linen = Yarn::new("linen").unwrap();
    let mut p = Pattern::new();
    for _ in 0..2 {
        p.new_course(&[&linen], 0).unwrap();
        p.insert(&[&linen], "k", 5).unwrap();
    }
    p.map_yarn(&linen, 1, true, None);

    let mut opts = GenerateOpts::for_backend(BackendKind::Kniterate);
    opts.half_gauge = true;
    let (ops, _) = compile(&p, &opts);

    let mut needles: Vec<Needle> = Vec::new();
    for op in &ops {
        match op {
            EmittedOp::Knit { needle, .. }
            | EmittedOp::Tuck { needle, .. }
            | EmittedOp::Miss { needle, .. }
            | EmittedOp::Drop { needle } => needles.push(*needle),
            EmittedOp::Xfer { src, dst } | EmittedOp::Split { src, dst, .. } => {
                needles.push(*src);
                needles.push(*dst);
            }
            _ => {}
        }
    }
    assert!(!needles.is_empty());
    for n in needles {
        assert_eq!(n.index % 2, 1, "needle {n} is not on the odd grid");
    }
}
