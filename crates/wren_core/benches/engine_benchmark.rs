//! Engine benchmarks
//!
//! Measures the control paths: settings fan-out and preset loading.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use wren_core::{
    Command, Direction, Engine, EngineConfig, FilePresetStore, JsonSettings, OfflineBackend,
    SettingKey, SettingValue, SettingsStore, PLUGINS,
};
use wren_dsp::NullHost;

fn engine(dir: &tempfile::TempDir) -> (Engine, Arc<JsonSettings>) {
    let settings = Arc::new(JsonSettings::in_memory());
    let (engine, _chains) = Engine::new(
        EngineConfig::default(),
        settings.clone(),
        Arc::new(FilePresetStore::new(dir.path())),
        Arc::new(OfflineBackend::new()),
        Arc::new(NullHost),
    )
    .unwrap();
    (engine, settings)
}

fn benchmark_bypass_toggle(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let (mut engine, _settings) = engine(&dir);

    c.bench_function("bypass_toggle", |b| {
        b.iter(|| {
            engine.execute(Command::SetBypass(black_box(true))).unwrap();
            engine.execute(Command::SetBypass(black_box(false))).unwrap();
            while engine.poll_event().is_some() {}
        })
    });
}

fn benchmark_unit_setting(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let (_engine, settings) = engine(&dir);
    settings.set(
        &SettingKey::pipeline(Direction::Output, PLUGINS),
        SettingValue::List(vec!["equalizer".into(), "limiter".into()]),
    );
    let key = SettingKey::unit(Direction::Output, "equalizer", "band3-gain");

    let mut gain = 0.0;
    c.bench_function("unit_setting_to_chain", |b| {
        b.iter(|| {
            gain = if gain > 6.0 { 0.0 } else { gain + 0.5 };
            settings.set(&key, SettingValue::Double(black_box(gain)));
        })
    });
}

fn benchmark_preset_load(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let (mut engine, settings) = engine(&dir);
    settings.set(
        &SettingKey::pipeline(Direction::Output, PLUGINS),
        SettingValue::List(vec!["equalizer".into(), "limiter".into()]),
    );
    engine
        .execute(Command::SavePreset {
            direction: Direction::Output,
            name: "Bench".into(),
        })
        .unwrap();

    c.bench_function("preset_load", |b| {
        b.iter(|| {
            engine
                .execute(Command::LoadPreset {
                    direction: Some(Direction::Output),
                    name: black_box("Bench".to_string()),
                })
                .unwrap();
            while engine.poll_event().is_some() {}
        })
    });
}

criterion_group!(
    benches,
    benchmark_bypass_toggle,
    benchmark_unit_setting,
    benchmark_preset_load
);
criterion_main!(benches);
