//! Scenarios 4, 5, and 6 from the component design's testable-properties
//! list: a listener/connector handshake over a bound port, a connect
//! timeout with no accepter, and a listener close waking a blocked
//! connector well before its timeout expires.

use std::time::{Duration, Instant};

use tinyos_core::{Config, Kernel, Task, NOPORT};

const PORT: i32 = 100;

fn consume_init_slot(kernel: &Kernel) {
    kernel.sys_exec(None, b"").unwrap();
}

#[test]
fn listener_and_connector_exchange_bytes_over_a_bound_port() {
    let kernel = Kernel::new(Config::default());
    consume_init_slot(&kernel);

    let server: Task = Box::new(|k, _args| {
        let lfid = k.sys_socket(PORT).unwrap();
        k.sys_listen(lfid).unwrap();
        let sfid = k.sys_accept(lfid).unwrap();
        k.sys_write(sfid, b"abc").unwrap();
        k.sys_close(sfid);
        k.sys_close(lfid);
        0
    });
    let server_pid = kernel.sys_exec(Some(server), b"").unwrap();

    // Give the listener a chance to bind before the client connects;
    // sys_connect itself doesn't retry on PortNotListening.
    std::thread::sleep(Duration::from_millis(50));

    let client: Task = Box::new(|k, _args| {
        let cfid = k.sys_socket(NOPORT).unwrap();
        k.sys_connect(cfid, PORT, Duration::from_millis(1000)).unwrap();
        let mut buf = [0u8; 3];
        let n = k.sys_read(cfid, &mut buf).unwrap();
        k.sys_close(cfid);
        (n == 3 && &buf == b"abc") as i32
    });
    let client_pid = kernel.sys_exec(Some(client), b"").unwrap();

    let (_, server_status) = kernel.sys_wait_child(Some(server_pid)).unwrap();
    let (_, client_status) = kernel.sys_wait_child(Some(client_pid)).unwrap();
    assert_eq!(server_status, Some(0));
    assert_eq!(client_status, Some(1));
}

#[test]
fn connect_to_a_port_with_no_listener_fails_immediately() {
    let kernel = Kernel::new(Config::default());
    let cfid = kernel.sys_socket(NOPORT).unwrap();
    let start = Instant::now();
    let result = kernel.sys_connect(cfid, PORT, Duration::from_millis(500));
    assert!(result.is_err());
    assert!(start.elapsed() < Duration::from_millis(100));
}

#[test]
fn connect_with_no_accepter_times_out_near_the_requested_duration() {
    let kernel = Kernel::new(Config::default());
    consume_init_slot(&kernel);

    let listener: Task = Box::new(|k, _args| {
        let lfid = k.sys_socket(PORT).unwrap();
        k.sys_listen(lfid).unwrap();
        // Never call accept; just hold the listener open.
        std::thread::sleep(Duration::from_millis(400));
        k.sys_close(lfid);
        0
    });
    kernel.sys_exec(Some(listener), b"").unwrap();
    std::thread::sleep(Duration::from_millis(50));

    let cfid = kernel.sys_socket(NOPORT).unwrap();
    let start = Instant::now();
    let result = kernel.sys_connect(cfid, PORT, Duration::from_millis(100));
    let elapsed = start.elapsed();

    assert!(result.is_err());
    assert!(elapsed >= Duration::from_millis(90));
    assert!(elapsed < Duration::from_millis(350));
}

#[test]
fn closing_the_listener_wakes_a_blocked_connector_before_its_timeout() {
    let kernel = Kernel::new(Config::default());
    consume_init_slot(&kernel);

    let lfid = kernel.sys_socket(PORT).unwrap();
    kernel.sys_listen(lfid).unwrap();

    let connector: Task = Box::new(|k, _args| {
        let cfid = k.sys_socket(NOPORT).unwrap();
        let start = std::time::Instant::now();
        let result = k.sys_connect(cfid, PORT, Duration::from_secs(5));
        let elapsed = start.elapsed();
        (result.is_err() && elapsed < Duration::from_secs(2)) as i32
    });
    let connector_pid = kernel.sys_exec(Some(connector), b"").unwrap();

    // Give the connector time to enqueue its request before the listener closes.
    std::thread::sleep(Duration::from_millis(100));
    kernel.sys_close(lfid);

    let (_, status) = kernel.sys_wait_child(Some(connector_pid)).unwrap();
    assert_eq!(status, Some(1));
}
