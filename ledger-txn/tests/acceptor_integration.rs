//! Exercises the real acceptor/session fork path over a loopback socket
//! (spec.md §8 end-to-end scenario 5: concurrency + waiting-queue limits).

use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::time::Duration;

use ledger_txn::acceptor::Acceptor;

fn tmp_csv(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("ledger-txn-acceptor-test-{name}-{}", std::process::id()))
}

fn read_line(stream: &mut TcpStream) -> String {
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut line = String::new();
    reader.read_line(&mut line).unwrap();
    line.trim_end().to_string()
}

#[test]
fn single_client_inserts_commits_and_selects_over_the_wire() {
    let csv_path = tmp_csv("roundtrip");
    let _ = std::fs::remove_file(&csv_path);

    let mut acceptor = Acceptor::bind("127.0.0.1", 0, 1, 1, csv_path.clone()).unwrap();
    let addr = acceptor.local_addr().unwrap();

    let server = std::thread::spawn(move || {
        let _ = acceptor.run();
    });

    let mut client = TcpStream::connect(addr).unwrap();
    assert!(read_line(&mut client).starts_with("CONEXION_ESTABLECIDA"));

    writeln!(client, "BEGIN TRANSACTION").unwrap();
    assert_eq!(read_line(&mut client), "OK: Transaccion iniciada");

    writeln!(client, "INSERT 7 1000 foo").unwrap();
    assert_eq!(read_line(&mut client), "OK: Insertado con id 1");

    writeln!(client, "COMMIT TRANSACTION").unwrap();
    assert_eq!(read_line(&mut client), "OK: Transaccion confirmada");

    writeln!(client, "SELECT 1").unwrap();
    assert_eq!(read_line(&mut client), "RESULTADO:");
    assert_eq!(read_line(&mut client), "ID,ID_PROCESO,TIMESTAMP,DATO_ALEATORIO");
    assert_eq!(read_line(&mut client), "1,7,1000,foo");

    writeln!(client, "EXIT").unwrap();
    assert_eq!(read_line(&mut client), "OK: Adios");
    drop(client);

    ledger_txn::shutdown::request();
    // Nudge the acceptor's blocking `poll` past its timeout so it observes
    // the shutdown flag promptly instead of waiting for another connection.
    let _ = TcpStream::connect(addr);
    server.join().unwrap();

    let contents = std::fs::read_to_string(&csv_path).unwrap();
    assert!(contents.contains("1,7,1000,foo"));

    let _ = std::fs::remove_file(&csv_path);
    let _ = std::fs::remove_file(lock_sentinel_path(&csv_path));
}

#[test]
fn third_connection_is_rejected_when_active_and_waiting_are_both_full() {
    let csv_path = tmp_csv("limits");
    let _ = std::fs::remove_file(&csv_path);

    let mut acceptor = Acceptor::bind("127.0.0.1", 0, 1, 1, csv_path.clone()).unwrap();
    let addr = acceptor.local_addr().unwrap();

    let server = std::thread::spawn(move || {
        let _ = acceptor.run();
    });

    let mut first = TcpStream::connect(addr).unwrap();
    assert!(read_line(&mut first).starts_with("CONEXION_ESTABLECIDA"));

    let mut second = TcpStream::connect(addr).unwrap();
    assert!(read_line(&mut second).starts_with("EN_COLA_ESPERA: 1/1"));

    let mut third = TcpStream::connect(addr).unwrap();
    assert!(read_line(&mut third).starts_with("ERROR"));

    writeln!(first, "EXIT").unwrap();
    let _ = read_line(&mut first);
    drop(first);

    assert!(read_line(&mut second).starts_with("CONEXION_APROBADA"));

    writeln!(second, "EXIT").unwrap();
    let _ = read_line(&mut second);
    drop(second);
    drop(third);

    ledger_txn::shutdown::request();
    let _ = TcpStream::connect(addr);
    server.join().unwrap();

    let _ = std::fs::remove_file(&csv_path);
    let _ = std::fs::remove_file(lock_sentinel_path(&csv_path));
}

#[test]
fn insert_with_comma_payload_is_rejected_over_the_wire_and_leaves_no_trace() {
    let csv_path = tmp_csv("comma-payload");
    let _ = std::fs::remove_file(&csv_path);

    let mut acceptor = Acceptor::bind("127.0.0.1", 0, 1, 1, csv_path.clone()).unwrap();
    let addr = acceptor.local_addr().unwrap();

    let server = std::thread::spawn(move || {
        let _ = acceptor.run();
    });

    let mut client = TcpStream::connect(addr).unwrap();
    assert!(read_line(&mut client).starts_with("CONEXION_ESTABLECIDA"));

    writeln!(client, "BEGIN TRANSACTION").unwrap();
    assert_eq!(read_line(&mut client), "OK: Transaccion iniciada");

    writeln!(client, "INSERT 7 1000 foo,bar").unwrap();
    assert_eq!(read_line(&mut client), "ERROR: dato invalido: payload contains a comma or newline");

    // the rejected INSERT queued nothing, so COMMIT writes an empty data set.
    writeln!(client, "COMMIT TRANSACTION").unwrap();
    assert_eq!(read_line(&mut client), "OK: Transaccion confirmada");

    writeln!(client, "SELECT 1").unwrap();
    assert_eq!(read_line(&mut client), "ERROR: No se encontro registro");

    writeln!(client, "EXIT").unwrap();
    assert_eq!(read_line(&mut client), "OK: Adios");
    drop(client);

    ledger_txn::shutdown::request();
    let _ = TcpStream::connect(addr);
    server.join().unwrap();

    let contents = std::fs::read_to_string(&csv_path).unwrap();
    assert!(!contents.contains("foo,bar"));

    let _ = std::fs::remove_file(&csv_path);
    let _ = std::fs::remove_file(lock_sentinel_path(&csv_path));
}

fn lock_sentinel_path(csv_path: &std::path::Path) -> std::path::PathBuf {
    let mut name = csv_path.file_name().unwrap().to_os_string();
    name.push(".lock");
    csv_path.with_file_name(name)
}
