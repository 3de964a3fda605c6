use chainwalk::{
    CancelToken, Candidate, Config, Evaluation, Evolution, Frame, GenerationReport, Rollout,
    SegmentPose,
};
use macroquad::prelude::*;
use std::sync::mpsc;
use std::thread;

const TICKS_PER_FRAME: usize = 1;

/// Best candidate of one generation, handed from the search thread.
struct Showcase {
    generation: usize,
    candidate: Candidate,
}

/// The replay currently on screen.
struct Replay {
    showcase: Showcase,
    rollout: Rollout,
    cancel: CancelToken,
}

#[macroquad::main("chainwalk")]
async fn main() {
    request_new_screen_size(1000.0, 800.0);

    let config = load_config();
    let demo_ticks = config.evolution.demo_ticks;
    let physics = config.physics.clone();

    let (tx, rx) = mpsc::channel::<Showcase>();
    thread::spawn(move || {
        let mut evolution = match Evolution::new(config) {
            Ok(evolution) => evolution,
            Err(err) => {
                eprintln!("failed to start evolution: {err}");
                return;
            }
        };
        evolution.run(&mut |report: &GenerationReport| {
            // the window may be gone; the search carries on regardless
            let _ = tx.send(Showcase {
                generation: report.generation,
                candidate: report.best.clone(),
            });
        });
    });

    let mut replay: Option<Replay> = None;
    let mut pending: Option<Showcase> = None;

    loop {
        while let Ok(showcase) = rx.try_recv() {
            pending = Some(showcase);
        }

        if let Some(active) = &replay {
            if is_key_pressed(KeyCode::Escape) || is_key_pressed(KeyCode::Q) {
                active.cancel.cancel();
            }
        }

        let replay_done = replay
            .as_ref()
            .map_or(true, |active| active.rollout.outcome().is_some());
        if replay_done {
            if let Some(showcase) = pending.take() {
                let rollout = Rollout::new(&showcase.candidate.genome, demo_ticks, &physics);
                replay = Some(Replay {
                    showcase,
                    rollout,
                    cancel: CancelToken::new(),
                });
            }
        }

        clear_background(Color::from_rgba(220, 220, 220, 255));
        match replay.as_mut() {
            Some(active) => {
                for _ in 0..TICKS_PER_FRAME {
                    if active.rollout.advance(&active.cancel).is_some() {
                        break;
                    }
                }
                let frame = active.rollout.frame();
                draw_scene(&frame, physics.ground_height as f32);
                draw_overlay(active, &frame);
            }
            None => {
                draw_text("seeding population...", 20.0, 40.0, 30.0, BLACK);
            }
        }

        next_frame().await;
    }
}

fn load_config() -> Config {
    let Some(path) = std::env::args().nth(1) else {
        let mut config = Config::default();
        // keep the first showcase within a few seconds
        config.evolution.lineages = 20;
        config.evolution.seed_samples = 20;
        config.evolution.mutants_per_lineage = 50;
        return config;
    };
    match std::fs::read_to_string(&path).map(|raw| Config::from_json(&raw)) {
        Ok(Ok(config)) => config,
        Ok(Err(err)) => {
            eprintln!("failed parsing {path}: {err} - falling back to defaults");
            Config::default()
        }
        Err(err) => {
            eprintln!("failed reading {path}: {err} - falling back to defaults");
            Config::default()
        }
    }
}

fn draw_scene(frame: &Frame, ground_height: f32) {
    let camera = frame
        .poses
        .first()
        .map(|pose| vec2(pose.position[0] as f32, pose.position[1] as f32))
        .unwrap_or(Vec2::ZERO);

    let ground_top = world_to_screen(vec2(camera.x, ground_height), camera).y;
    let ground_color = Color::from_rgba(0, 160, 0, 255);
    draw_rectangle(0.0, ground_top, screen_width(), screen_height(), ground_color);

    // distance ticks every 100 units so motion reads against the ground
    let first_mark = ((camera.x - screen_width()) / 100.0).floor() as i32;
    let last_mark = ((camera.x + screen_width()) / 100.0).ceil() as i32;
    for mark in first_mark..=last_mark {
        let x = world_to_screen(vec2(mark as f32 * 100.0, ground_height), camera).x;
        draw_line(x, ground_top, x, ground_top + 12.0, 2.0, DARKGREEN);
    }

    for pose in &frame.poses {
        draw_segment(pose, camera);
    }
}

fn draw_segment(pose: &SegmentPose, camera: Vec2) {
    let (a, b) = pose.endpoints();
    let a = world_to_screen(vec2(a[0] as f32, a[1] as f32), camera);
    let b = world_to_screen(vec2(b[0] as f32, b[1] as f32), camera);
    let radius = pose.thickness as f32;
    draw_line(a.x, a.y, b.x, b.y, radius * 2.0, BLUE);
    draw_circle(a.x, a.y, radius, BLUE);
    draw_circle(b.x, b.y, radius, BLUE);
    draw_circle(a.x, a.y, 2.5, WHITE);
}

fn draw_overlay(replay: &Replay, frame: &Frame) {
    draw_text(&format!("Distance: {:.2}", frame.displacement), 10.0, 30.0, 30.0, BLACK);
    draw_text(
        &format!(
            "generation {}  best {:.2}  segments {}",
            replay.showcase.generation,
            replay.showcase.candidate.fitness,
            replay.showcase.candidate.genome.segment_count()
        ),
        10.0,
        58.0,
        22.0,
        DARKGRAY,
    );
    draw_text(
        &format!("tick {} / {}  phase {}", frame.tick, replay.rollout.ticks(), frame.phase),
        10.0,
        82.0,
        22.0,
        DARKGRAY,
    );

    let status = match replay.rollout.outcome() {
        None => "press Esc or Q to skip this run".to_string(),
        Some(Evaluation::Completed { displacement }) => {
            format!("finished: {displacement:.2} - waiting for next generation")
        }
        Some(Evaluation::Cancelled { tick }) => {
            format!("aborted at tick {tick} - waiting for next generation")
        }
        Some(Evaluation::Unstable { error }) => format!("unstable: {error}"),
    };
    draw_text(&status, 10.0, screen_height() - 20.0, 20.0, GRAY);
}

fn world_to_screen(position: Vec2, camera: Vec2) -> Vec2 {
    vec2(
        screen_width() * 0.5 + (position.x - camera.x),
        screen_height() * 0.5 - (position.y - camera.y),
    )
}
