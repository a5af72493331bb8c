//! CCRE Drive Demo - Auto and Teleop competing for one speed output
//!
//! A 20ms control loop reads an arbitrated speed while a timeline flips the
//! mode requests on the wall clock:
//!
//! 1. Disabled - speed holds the 0.0 default
//! 2. Auto     - speed follows the autonomous routine
//! 3. Teleop   - speed follows the joystick, outranking Auto
//!
//! Run: `cargo run -p ccre_core --example drive_demo`

use ccre_core::prelude::*;
use ccre_core::Introspect;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn main() -> Result<(), ccre_core::CcreError> {
    let runtime = Runtime::realtime()?;

    let drive = BehaviorArbitrator::new("Drive")?;
    let auto_request = BooleanCell::new(false);
    let teleop_request = BooleanCell::new(false);
    let auto = drive.add_behavior("Auto", auto_request.as_input())?;
    let teleop = drive.add_behavior("Teleop", teleop_request.as_input())?;

    let speed = drive.add_float(0.0);
    let joystick = FloatCell::new(0.0);
    speed.attach_value(&auto, 0.4)?;
    speed.attach(&teleop, joystick.as_input())?;

    drive.on_active_changed(Arc::new(|active: Option<Behavior>| {
        println!(
            "  mode -> {}",
            active.as_ref().map_or("Disabled", |b| b.name())
        );
    }));

    let tick = Arc::new(AtomicU64::new(0));
    let (loop_speed, loop_tick, loop_stick) = (speed.clone(), tick.clone(), joystick.clone());
    runtime.every_millis("control", 20, move || {
        let n = loop_tick.fetch_add(1, Ordering::SeqCst);
        // Sweep the stick so Teleop is visibly different from Auto.
        loop_stick.set(((n % 50) as f32 / 25.0) - 1.0);
        if n % 10 == 0 {
            println!("  t={:>4}ms speed={:+.2}", n * 20, loop_speed.get());
        }
    })?;

    println!("Disabled");
    std::thread::sleep(Duration::from_millis(300));
    println!("Auto requested");
    auto_request.set(true);
    std::thread::sleep(Duration::from_millis(300));
    println!("Teleop requested");
    teleop_request.set(true);
    std::thread::sleep(Duration::from_millis(300));

    println!("\n{}", drive.introspect());
    println!("\n{}", runtime.scheduler().introspect());

    runtime.shutdown()?;
    Ok(())
}
