use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use ulid::Ulid;

use classgrid::directory::{Cohort, CourseUnit, InMemoryDirectory, Instructor, InstructorStatus, Program};
use classgrid::engine::{Engine, EngineError};
use classgrid::model::*;

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    if latencies.is_empty() {
        println!("  {label}: no samples");
        return;
    }
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, max={:.2}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies[latencies.len() - 1].as_secs_f64() * 1000.0,
    );
}

struct Campus {
    engine: Arc<Engine>,
    cohort: Ulid,
    program: Ulid,
    course_unit: Ulid,
    instructors: Vec<Ulid>,
}

fn setup(n_instructors: usize) -> Campus {
    let directory = Arc::new(InMemoryDirectory::new());
    let (cohort, program, course_unit) = (Ulid::new(), Ulid::new(), Ulid::new());
    directory.insert_cohort(Cohort { id: cohort, name: "bench".into(), active: true });
    directory.insert_program(Program { id: program, name: "bench".into() });
    directory.insert_course_unit(CourseUnit {
        id: course_unit,
        program_id: program,
        name: "bench".into(),
        coefficient: 1.0,
    });
    directory.link_program(cohort, program);
    let instructors: Vec<Ulid> = (0..n_instructors)
        .map(|i| {
            let id = Ulid::new();
            directory.insert_instructor(Instructor {
                id,
                name: format!("instructor {i}"),
                status: InstructorStatus::Active,
            });
            id
        })
        .collect();

    let dir = std::env::temp_dir().join(format!("classgrid_bench_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    let engine = Arc::new(Engine::new(dir.join("classgrid.wal"), directory).unwrap());
    Campus { engine, cohort, program, course_unit, instructors }
}

impl Campus {
    fn draft(&self, instructor: Ulid, day: Weekday, hour: u32, room: Option<String>) -> AssignmentDraft {
        AssignmentDraft {
            cohort_id: self.cohort,
            program_id: self.program,
            course_unit_id: self.course_unit,
            instructor_id: instructor,
            slots: vec![SlotRequest {
                day,
                start_time: ClockTime::from_hm(hour, 0).unwrap(),
                end_time: ClockTime::from_hm(hour + 1, 0).unwrap(),
                room_label: room,
            }],
            period: Period {
                start_date: NaiveDate::from_ymd_opt(2026, 9, 1).unwrap(),
                end_date: NaiveDate::from_ymd_opt(2027, 1, 31).unwrap(),
            },
        }
    }
}

/// Hour-long cells starting 00:00 through 22:00 on every day.
fn grid() -> impl Iterator<Item = (Weekday, u32)> {
    Weekday::ALL.into_iter().flat_map(|d| (0..23).map(move |h| (d, h)))
}

async fn phase1_sequential() {
    let campus = setup(10);
    let mut latencies = Vec::new();
    let start = Instant::now();

    for (i, instructor) in campus.instructors.iter().enumerate() {
        for (day, hour) in grid() {
            let room = Some(format!("R{i}"));
            let t = Instant::now();
            campus
                .engine
                .create_assignment(campus.draft(*instructor, day, hour, room))
                .await
                .unwrap();
            latencies.push(t.elapsed());
        }
    }

    let n = latencies.len();
    let elapsed = start.elapsed();
    println!(
        "  {n} assignments in {:.2}s = {:.0} ops/sec",
        elapsed.as_secs_f64(),
        n as f64 / elapsed.as_secs_f64()
    );
    print_latency("create latency", &mut latencies);
}

async fn phase2_contention() {
    let campus = Arc::new(setup(50));
    let rooms = ["Amphi A", "Amphi B", "Lab 1", "Lab 2", "B204"];
    let accepted = Arc::new(AtomicUsize::new(0));
    let rejected = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();

    let mut handles = Vec::new();
    for (i, instructor) in campus.instructors.clone().into_iter().enumerate() {
        let campus = campus.clone();
        let (accepted, rejected) = (accepted.clone(), rejected.clone());
        handles.push(tokio::spawn(async move {
            let mut latencies = Vec::new();
            for (day, hour) in grid().step_by(3) {
                let room = rooms[(i + hour as usize) % rooms.len()].to_lowercase();
                let t = Instant::now();
                match campus
                    .engine
                    .create_assignment(campus.draft(instructor, day, hour, Some(room)))
                    .await
                {
                    Ok(_) => accepted.fetch_add(1, Ordering::Relaxed),
                    Err(EngineError::SchedulingConflict(_)) => rejected.fetch_add(1, Ordering::Relaxed),
                    Err(e) => panic!("unexpected error: {e}"),
                };
                latencies.push(t.elapsed());
            }
            latencies
        }));
    }

    let mut latencies = Vec::new();
    for h in handles {
        latencies.extend(h.await.unwrap());
    }
    let elapsed = start.elapsed();
    println!(
        "  {} tasks: {} accepted, {} rejected in {:.2}s",
        campus.instructors.len(),
        accepted.load(Ordering::Relaxed),
        rejected.load(Ordering::Relaxed),
        elapsed.as_secs_f64()
    );
    print_latency("contended create latency", &mut latencies);

    let all = campus.engine.list_assignments(&AssignmentFilter::default());
    let mut booked = std::collections::HashSet::new();
    for a in &all {
        for s in &a.slots {
            if let Some(room) = s.room_id {
                assert!(booked.insert((room, s.day, s.start_time)), "room double-booked: {room}");
            }
        }
    }
    println!("  no double bookings across {} assignments, {} rooms", all.len(), campus.engine.list_rooms().len());
}

async fn phase3_reads_under_load() {
    let campus = Arc::new(setup(20));
    for (i, instructor) in campus.instructors.iter().enumerate().take(10) {
        for (day, hour) in grid().take(40) {
            campus
                .engine
                .create_assignment(campus.draft(*instructor, day, hour, Some(format!("Pre {i}"))))
                .await
                .unwrap();
        }
    }

    let stop = Arc::new(AtomicBool::new(false));
    let mut writers = Vec::new();
    for instructor in campus.instructors[10..].iter().copied() {
        let (campus, stop) = (campus.clone(), stop.clone());
        writers.push(tokio::spawn(async move {
            let mut cells = grid().cycle();
            while !stop.load(Ordering::Relaxed) {
                let Some((day, hour)) = cells.next() else { break };
                let draft = campus.draft(instructor, day, hour, Some(format!("W{hour}")));
                match campus.engine.create_assignment(draft).await {
                    Ok(a) => {
                        let _ = campus.engine.delete_assignment(a.id).await;
                    }
                    Err(_) => tokio::task::yield_now().await,
                }
            }
        }));
    }

    let mut readers = Vec::new();
    for r in 0..8 {
        let campus = campus.clone();
        readers.push(tokio::spawn(async move {
            let instructor = campus.instructors[r % 10];
            let mut latencies = Vec::new();
            for i in 0..500u32 {
                let t = Instant::now();
                if i % 2 == 0 {
                    let filter = AssignmentFilter { instructor: Some(instructor), ..Default::default() };
                    campus.engine.list_assignments(&filter);
                } else {
                    let candidate = campus.draft(instructor, Weekday::Mon, i % 23, Some(format!("Pre {r}")));
                    campus.engine.preview_conflicts(&candidate, None).unwrap();
                }
                latencies.push(t.elapsed());
            }
            latencies
        }));
    }

    let mut latencies = Vec::new();
    for h in readers {
        latencies.extend(h.await.unwrap());
    }
    stop.store(true, Ordering::Relaxed);
    for h in writers {
        let _ = h.await;
    }
    print_latency("list/preview latency", &mut latencies);
}

async fn phase4_compaction() {
    let campus = setup(5);
    for instructor in &campus.instructors {
        for (day, hour) in grid() {
            let a = campus
                .engine
                .create_assignment(campus.draft(*instructor, day, hour, None))
                .await
                .unwrap();
            if hour % 2 == 0 {
                campus.engine.delete_assignment(a.id).await.unwrap();
            }
        }
    }
    let appends = campus.engine.wal_appends_since_compact().await;
    let t = Instant::now();
    campus.engine.compact_wal().await.unwrap();
    println!(
        "  compacted {appends} appends down to {} assignments in {:.2}ms",
        campus.engine.assignment_count(),
        t.elapsed().as_secs_f64() * 1000.0
    );
}

#[tokio::main]
async fn main() {
    println!("=== classgrid stress benchmark ===\n");

    println!("[phase 1] sequential create throughput");
    phase1_sequential().await;

    println!("\n[phase 2] concurrent creates contending for rooms");
    phase2_contention().await;

    println!("\n[phase 3] read latency under write load");
    phase3_reads_under_load().await;

    println!("\n[phase 4] WAL compaction");
    phase4_compaction().await;

    println!("\n=== done ===");
}
