/// Hierarchical Clock Demonstration
///
/// Shows a master clock forking two independent voices that each keep their
/// own tempo, plus a tempo ramp on the master itself.
use hierarchical_clock::clock::Clock;
use hierarchical_clock::config::ClockConfig;

fn main() {
    env_logger::init();

    println!("Hierarchical Clock Demo");
    println!("=======================");

    let master = Clock::new_master(Some("master"), &ClockConfig::default());
    master.set_tempo(120.0);
    println!("master tempo: {} bpm", master.tempo());

    let voice_a = master.fork(Some("voice-a"), |clock| {
        for beat in 0..4 {
            clock.wait(1.0);
            println!("  voice-a: beat {} (t={:.3}s)", beat + 1, clock.time_in_master());
        }
    });

    let voice_b = master.fork(Some("voice-b"), |clock| {
        clock.set_rate(1.5); // voice-b runs at 1.5x the master's beat rate
        for beat in 0..6 {
            clock.wait(1.0);
            println!("  voice-b: beat {} (t={:.3}s)", beat + 1, clock.time_in_master());
        }
    });

    println!("ramping master tempo from 120 to 90 bpm over 4 beats...");
    master.set_tempo_target(90.0, 4.0, 0.0);

    master.wait_for_children_to_finish();
    println!("done. master beats elapsed: {:.2}", master.beats());

    let _ = (voice_a, voice_b);
}
