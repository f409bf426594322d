//! Integration tests for transform passes over whole captures
//!
//! Covers the pass invariants end to end: identity chains reproduce their
//! input, originals keep their order, synthetic ids never collide and
//! scoped tweaks leave no trace in the final state.

use super::common::fixtures::{frame_capture, numbered, opaque};
use gfxreplay::atom::{Capability, IdSpace};
use gfxreplay::capture::{decode_atoms, encode_atoms, DEFAULT_MAX_FRAME_SIZE};
use gfxreplay::transform::{on_frame_end, EarlyTerminator, UndefinedFramebuffer};
use gfxreplay::{Atom, AtomId, AtomOp, Ctx, GlVersion, Pass, Transform, Tweaker};
use proptest::prelude::*;
use std::collections::HashSet;

fn run(transforms: Vec<Box<dyn Transform>>, input: &[(AtomId, Atom)]) -> Vec<(AtomId, Atom)> {
    let ctx = Ctx::new("test");
    let mut out = Vec::new();
    Pass::new(transforms)
        .run(&ctx, input.to_vec(), &mut out)
        .expect("pass failed");
    out
}

fn original_ids(out: &[(AtomId, Atom)]) -> Vec<AtomId> {
    out.iter()
        .map(|(id, _)| *id)
        .filter(|id| !id.is_none())
        .collect()
}

proptest! {
    /// An empty chain writes exactly what it reads.
    #[test]
    fn prop_identity_chain_reproduces_input(gaps in prop::collection::vec(1u64..5, 0..40)) {
        let mut next = 0u64;
        let input: Vec<(AtomId, Atom)> = gaps
            .iter()
            .enumerate()
            .map(|(i, gap)| {
                next += gap;
                (AtomId(next), Atom::new(opaque(&format!("call{i}"))))
            })
            .collect();

        prop_assert_eq!(run(Vec::new(), &input), input);
    }

    /// Injecting transforms never reorder, drop or duplicate originals.
    #[test]
    fn prop_originals_survive_in_order(frames in 0u32..6, preserve in any::<bool>(), es3 in any::<bool>()) {
        let input = frame_capture(frames, preserve);
        let version = if es3 { GlVersion::new(3, 0) } else { GlVersion::new(2, 0) };
        let out = run(vec![Box::new(UndefinedFramebuffer::new(version))], &input);

        let expected: Vec<AtomId> = input.iter().map(|(id, _)| *id).collect();
        prop_assert_eq!(original_ids(&out), expected);
    }

    /// Allocated ids are distinct and avoid everything already in use.
    #[test]
    fn prop_allocation_avoids_taken_ids(
        taken in prop::collection::hash_set(1u32..64, 0..32),
        count in 1usize..48,
    ) {
        let tag = b'B';
        let taken: HashSet<u32> = taken
            .into_iter()
            .map(|n| (u32::from(tag) << 24) | n)
            .collect();
        let mut space = IdSpace::new();
        let mut seen = HashSet::new();
        for _ in 0..count {
            let id = space.allocate(tag, |id| taken.contains(&id)).unwrap();
            prop_assert!(!taken.contains(&id));
            prop_assert!(seen.insert(id));
        }
    }
}

#[test]
fn test_identity_pass_matches_plain_state() {
    let input = frame_capture(4, false);
    let ctx = Ctx::new("test");
    let mut out = Vec::new();
    let outcome = Pass::new(Vec::new())
        .run(&ctx, input.clone(), &mut out)
        .unwrap();

    assert_eq!(outcome.consumed, input.len() as u64);
    assert_eq!(outcome.emitted, input.len() as u64);
    let context = outcome.state.current_context().unwrap();
    assert_eq!(context.objects.buffers.len(), 4);
    // Four frames toggle depth testing on, off, on, off.
    assert!(!context.is_enabled(Capability::DepthTest));
}

#[test]
fn test_passes_are_deterministic() {
    let input = frame_capture(3, false);
    let first = run(
        vec![Box::new(UndefinedFramebuffer::new(GlVersion::new(3, 0)))],
        &input,
    );
    let second = run(
        vec![Box::new(UndefinedFramebuffer::new(GlVersion::new(3, 0)))],
        &input,
    );
    assert_eq!(first, second);
}

#[test]
fn test_terminator_after_injector_cuts_injected_tail() {
    let input = frame_capture(3, false);
    // Atom 6 is the first frame's swap.
    let out = run(
        vec![
            Box::new(UndefinedFramebuffer::new(GlVersion::new(2, 0))),
            Box::new(EarlyTerminator::new(AtomId(6))),
        ],
        &input,
    );

    assert_eq!(original_ids(&out), (0..=6).map(AtomId).collect::<Vec<_>>());
    let (last_id, last) = out.last().unwrap();
    assert_eq!(*last_id, AtomId(6));
    assert!(last.flags().is_end_of_frame());
}

#[test]
fn test_frame_end_tweak_is_reverted_before_next_frame() {
    let input = frame_capture(2, true);
    let ctx = Ctx::new("test");

    let mut plain = Vec::new();
    let reference = Pass::new(Vec::new())
        .run(&ctx, input.clone(), &mut plain)
        .unwrap()
        .state;

    let overlay = on_frame_end("overlay", |ctx, out| {
        Tweaker::scope(ctx, out, |t| {
            t.enable(Capability::Blend)?;
            t.disable(Capability::DepthTest)?;
            t.write(opaque("drawOverlay"))
        })
    });
    let mut out = Vec::new();
    let state = Pass::new(vec![Box::new(overlay)])
        .run(&ctx, input, &mut out)
        .unwrap()
        .state;

    assert_eq!(state, reference);
    let overlays = out
        .iter()
        .filter(|(_, a)| matches!(a.op(), AtomOp::Opaque { name, .. } if name == "drawOverlay"))
        .count();
    assert_eq!(overlays, 2);
}

#[test]
fn test_rewritten_capture_round_trips_through_codec() {
    let input = frame_capture(2, false);
    let out = run(
        vec![Box::new(UndefinedFramebuffer::new(GlVersion::new(3, 0)))],
        &input,
    );
    let bytes = encode_atoms(&out).unwrap();
    let decoded = decode_atoms(&bytes, DEFAULT_MAX_FRAME_SIZE).unwrap();
    assert_eq!(decoded, out);
}

#[test]
fn test_atom_without_context_fails_pass() {
    let input = numbered(vec![
        opaque("eglGetDisplay"),
        AtomOp::Enable {
            capability: Capability::Blend,
        },
    ]);
    let ctx = Ctx::new("test");
    let mut out = Vec::new();
    let err = Pass::new(Vec::new())
        .run(&ctx, input, &mut out)
        .unwrap_err();

    assert_eq!(err.atom, AtomId(1));
    assert_eq!(err.kind(), gfxreplay::ErrorKind::Validation);
    assert_eq!(out.len(), 1);
}
