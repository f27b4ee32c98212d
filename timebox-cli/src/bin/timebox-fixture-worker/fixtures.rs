use std::time::Duration;
use timebox_core::Problem;

pub const HANG_PROBLEM: u32 = 90;
pub const CRASH_PROBLEM: u32 = 91;
pub const SLEEPY_PROBLEM: u32 = 92;

/// Built-in catalogue plus methods that hang, crash or sleep
pub fn problems() -> Vec<Problem> {
    let mut problems = timebox_cli::problems();
    problems.extend([
        Problem::new(HANG_PROBLEM, "Never returns").method("spin", || loop {
            std::hint::spin_loop();
        }),
        Problem::new(CRASH_PROBLEM, "Always panics").method("boom", || panic!("fixture method failed")),
        Problem::new(SLEEPY_PROBLEM, "Sleeps briefly").answer(92).method("nap", || {
            std::thread::sleep(Duration::from_millis(300));
            92
        }),
    ]);
    problems
}
