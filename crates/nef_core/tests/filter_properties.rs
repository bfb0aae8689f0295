use std::sync::Arc;
use std::thread;

use nef_core::config::FilterParameters;
use nef_core::filter::FilterBuffer;
use nef_core::Fixed;

#[test]
fn test_filter_decays_geometrically_without_input() {
    let mut buffer = FilterBuffer::new(1, &FilterParameters::new(Fixed::from_num(0.5), u32::MAX))
        .expect("allocation");
    buffer.accumulate(0, Fixed::from_num(2));
    buffer.step();
    assert_eq!(buffer.filtered()[0], Fixed::ONE);

    let mut expected = Fixed::ONE;
    for step in 0..10 {
        buffer.step();
        expected *= Fixed::from_num(0.5);
        assert_eq!(buffer.filtered()[0], expected, "step {}", step);
    }
}

#[test]
fn test_lowpass_settles_at_constant_input() {
    let mut buffer = FilterBuffer::new(1, &FilterParameters::lowpass(0.01, 0.001)).unwrap();
    for _ in 0..500 {
        buffer.accumulate(0, Fixed::ONE);
        buffer.step();
    }
    let settled = buffer.filtered()[0];
    assert!(
        (settled - Fixed::ONE).abs() < Fixed::from_num(0.01),
        "settled at {}",
        settled
    );
}

#[test]
fn test_accumulated_total_consumed_exactly_once() {
    let mut buffer = FilterBuffer::new(3, &FilterParameters::default()).unwrap();
    for d in 0..3 {
        for _ in 0..4 {
            buffer.accumulate(d, Fixed::from_num(0.25));
        }
    }
    buffer.step();
    assert_eq!(buffer.filtered(), &[Fixed::ONE; 3]);
    for d in 0..3 {
        assert_eq!(buffer.accumulator().peek(d), Fixed::ZERO);
    }

    // No new packets: the same total must not be seen again
    buffer.step();
    assert_eq!(buffer.filtered(), &[Fixed::ZERO; 3]);
}

#[test]
fn test_concurrent_receive_never_loses_or_duplicates() {
    const PACKETS: i32 = 20_000;
    let mut buffer = FilterBuffer::new(1, &FilterParameters::default()).unwrap();
    let accumulator = buffer.accumulator();
    let quantum = Fixed::from_bits(1);

    println!(">> Receiving {} packets while stepping", PACKETS);
    let sender = {
        let accumulator = Arc::clone(&accumulator);
        thread::spawn(move || {
            for _ in 0..PACKETS {
                assert!(accumulator.accumulate(0, quantum));
            }
        })
    };

    // With zero decay each step emits exactly what it consumed
    let mut seen: i32 = 0;
    while !sender.is_finished() {
        buffer.step();
        seen += buffer.filtered()[0].to_bits();
    }
    sender.join().expect("sender thread");
    buffer.step();
    seen += buffer.filtered()[0].to_bits();

    assert_eq!(seen, PACKETS);
    assert_eq!(accumulator.peek(0), Fixed::ZERO);
}
