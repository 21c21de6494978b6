//! Temporary-generation churn stays bounded, and pool-backed containers
//! construct and destroy their elements exactly like ordinary ones.

use std::sync::atomic::{AtomicIsize, Ordering};
use std::sync::Mutex;

use allocator_api2::vec::Vec as PoolVec;
use genpool::{DefaultPolicy, Pool, PoolAllocator};

#[test]
fn test_temp_churn_is_bounded() {
    const ITERATIONS: usize = 1_000;
    const ARRAYS: usize = 32;
    const WORDS: usize = 1024;

    let pool = Pool::new().unwrap();
    let per_iteration = ARRAYS * WORDS * std::mem::size_of::<usize>();

    for _ in 0..ITERATIONS {
        for _ in 0..ARRAYS {
            pool.new_array_temp::<usize>(WORDS).unwrap();
        }
        let (primary, temp) = pool.allocated_bytes();
        assert_eq!(primary, 0, "temp churn must not touch the primary side");
        assert!(temp >= per_iteration);
        assert!(
            temp < 2 * per_iteration,
            "temp usage grew across iterations: {} bytes",
            temp
        );
        pool.clean_temp();
        assert_eq!(pool.allocated_bytes().1, 0);
    }
}

// RAII counter element for the container test. One static per test binary
// is fine: no other test in this file constructs `Test` values.
static LIVE: AtomicIsize = AtomicIsize::new(0);
static COUNTER_SERIAL: Mutex<()> = Mutex::new(());

struct Test {
    _payload: u64,
}

impl Test {
    fn new(payload: u64) -> Self {
        LIVE.fetch_add(1, Ordering::Relaxed);
        Self { _payload: payload }
    }
}

impl Drop for Test {
    fn drop(&mut self) {
        LIVE.fetch_sub(1, Ordering::Relaxed);
    }
}

#[test]
fn test_container_constructs_and_destroys_exactly() {
    let _guard = COUNTER_SERIAL.lock().unwrap();

    let pool = Pool::new().unwrap();
    let mut v = PoolVec::new_in(PoolAllocator::<DefaultPolicy>::new(&pool));
    assert_eq!(LIVE.load(Ordering::Relaxed), 0);

    for i in 0..1024u64 {
        v.push(Test::new(i));
    }
    assert_eq!(LIVE.load(Ordering::Relaxed), 1024);

    v.truncate(512);
    assert_eq!(LIVE.load(Ordering::Relaxed), 512);

    for i in 0..512u64 {
        v.push(Test::new(i));
    }
    assert_eq!(LIVE.load(Ordering::Relaxed), 1024);

    v.clear();
    assert_eq!(LIVE.load(Ordering::Relaxed), 0);

    // Dropping the vec frees no pool memory; the generation release does.
    let held = pool.allocated_bytes().0;
    assert!(held >= 1024 * std::mem::size_of::<Test>());
    drop(v);
    assert_eq!(pool.allocated_bytes().0, held);
    pool.clean();
    assert_eq!(pool.allocated_bytes(), (0, 0));
}
