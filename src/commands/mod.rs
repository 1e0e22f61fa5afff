//! Command façade - typed VSCP operations on top of [`Client`].
//!
//! Every operation validates its input before anything is queued or
//! written, issues one command (authentication issues two) and parses the
//! payload with the grammar of that verb. A `-OK` reply surfaces as
//! [`VscpError::Server`].
//!
//! ```ignore
//! client.login("admin", "secret").await?;
//! let version = client.get_remote_version().await?;
//! for iface in client.get_interfaces().await? {
//!     println!("{} {} {}", iface.index, iface.guid, iface.name);
//! }
//! ```

mod types;

pub use types::{
    is_base64_type, ChannelInfo, Filter, Interface, RemoteVersion, Statistics, Variable,
    VariableEntry, VariableWrite,
};

use crate::client::Client;
use crate::codec::auth_digest;
use crate::error::{Result, VscpError};
use crate::protocol::{parse_number, verbs, Command, Event, Guid};
use crate::queue::ModeChange;

use types::{check_variable_name, guid, parse_capabilities};

/// First payload line, or a malformed-response error naming `verb`.
fn first_line(lines: Vec<String>, verb: &str) -> Result<String> {
    lines
        .into_iter()
        .next()
        .ok_or_else(|| VscpError::MalformedResponse(format!("empty {} response", verb)))
}

fn check_token(value: &str, what: &str) -> Result<()> {
    if value.is_empty() {
        return Err(VscpError::InvalidArgument(format!("empty {}", what)));
    }
    Ok(())
}

impl Client {
    async fn run(&self, verb: &str, argument: Option<&str>) -> Result<Vec<String>> {
        let command = Command::new(verb, argument)?;
        self.execute(command, ModeChange::None).await
    }

    async fn run_line(&self, verb: &str, argument: Option<&str>) -> Result<String> {
        first_line(self.run(verb, argument).await?, verb)
    }

    /// `NOOP`
    pub async fn noop(&self) -> Result<()> {
        self.run(verbs::NOOP, None).await?;
        Ok(())
    }

    /// `USER <name>`
    pub async fn user(&self, name: &str) -> Result<()> {
        check_token(name, "user name")?;
        self.run(verbs::USER, Some(name)).await?;
        Ok(())
    }

    /// `PASS <password>`
    pub async fn password(&self, password: &str) -> Result<()> {
        check_token(password, "password")?;
        self.run(verbs::PASS, Some(password)).await?;
        Ok(())
    }

    /// Plain login: `USER` and `PASS` pipelined, each settled on its own.
    pub async fn login(&self, name: &str, password: &str) -> Result<()> {
        check_token(name, "user name")?;
        check_token(password, "password")?;
        let user = Command::new(verbs::USER, Some(name))?;
        let pass = Command::new(verbs::PASS, Some(password))?;

        let user = self.issue(user, ModeChange::None)?;
        let pass = self.issue(pass, ModeChange::None)?;

        let user = user.await.and_then(|frame| frame.into_result());
        let pass = pass.await.and_then(|frame| frame.into_result());
        user?;
        pass?;
        Ok(())
    }

    /// `CHALLENGE`: request a nonce for [`authenticate`](Self::authenticate).
    pub async fn challenge(&self) -> Result<String> {
        let nonce = self.run_line(verbs::CHALLENGE, None).await?;
        let nonce = nonce.trim();
        if nonce.is_empty() {
            return Err(VscpError::MalformedResponse("empty challenge nonce".into()));
        }
        Ok(nonce.to_string())
    }

    /// Challenge/response login: `CHALLENGE`, then
    /// `AUTH <user>;<md5hex(password:nonce)>`.
    pub async fn authenticate(&self, name: &str, password: &str) -> Result<()> {
        check_token(name, "user name")?;
        if name.contains([';', ' ']) {
            return Err(VscpError::InvalidArgument(format!(
                "user name {:?} contains a separator",
                name
            )));
        }

        let nonce = self.challenge().await?;
        let argument = format!("{};{}", name, auth_digest(password, &nonce));
        self.run(verbs::AUTH, Some(&argument)).await?;
        Ok(())
    }

    /// `QUIT`: the server answers and closes the connection. After a
    /// positive reply the close is not reported to connection-error
    /// listeners.
    pub async fn quit(&self) -> Result<()> {
        let command = Command::new(verbs::QUIT, None)?;
        self.execute(command, ModeChange::CloseOnSuccess).await?;
        Ok(())
    }

    /// `VERSION`
    pub async fn get_remote_version(&self) -> Result<RemoteVersion> {
        self.run_line(verbs::VERSION, None).await?.parse()
    }

    /// `CHKDATA`: number of events waiting on the server.
    pub async fn get_pending_event_count(&self) -> Result<u32> {
        parse_number(&self.run_line(verbs::CHKDATA, None).await?, "event count")
    }

    /// `CLRALL`
    pub async fn clear_pending_events(&self) -> Result<()> {
        self.run(verbs::CLRALL, None).await?;
        Ok(())
    }

    /// `RETR <count>`: fetch up to `count` queued events.
    pub async fn retrieve_events(&self, count: u32) -> Result<Vec<Event>> {
        if count == 0 {
            return Err(VscpError::InvalidArgument("event count must be at least 1".into()));
        }
        self.run(verbs::RETR, Some(&count.to_string()))
            .await?
            .iter()
            .filter(|line| !line.trim().is_empty())
            .map(|line| Event::parse_line(line))
            .collect()
    }

    /// `SEND <event line>`
    pub async fn send_event(&self, event: &Event) -> Result<()> {
        event.validate()?;
        self.run(verbs::SEND, Some(&event.to_line())).await?;
        Ok(())
    }

    /// `RCVLOOP`: on success the connection switches to event delivery.
    /// Events go to the listeners registered with
    /// [`on_event`](Client::on_event).
    pub async fn start_rcv_loop(&self) -> Result<()> {
        let command = Command::new(verbs::RCVLOOP, None)?;
        self.execute(command, ModeChange::EnterLoopOnSuccess).await?;
        Ok(())
    }

    /// `QUITLOOP`: back to command/response mode once the server confirms.
    /// Only valid in the receive loop; events that arrive before the
    /// confirmation are still delivered to listeners.
    pub async fn stop_rcv_loop(&self) -> Result<()> {
        let command = Command::new(verbs::QUITLOOP, None)?;
        self.execute(command, ModeChange::LeaveLoop).await?;
        Ok(())
    }

    /// `INTERFACE LIST`
    pub async fn get_interfaces(&self) -> Result<Vec<Interface>> {
        self.run(verbs::INTERFACE_LIST, None)
            .await?
            .iter()
            .filter(|line| !line.trim().is_empty())
            .map(|line| line.parse::<Interface>())
            .collect()
    }

    /// `STAT`
    pub async fn get_statistics(&self) -> Result<Statistics> {
        self.run_line(verbs::STAT, None).await?.parse()
    }

    /// `INFO`
    pub async fn get_info(&self) -> Result<ChannelInfo> {
        self.run_line(verbs::INFO, None).await?.parse()
    }

    /// `CHID`
    pub async fn get_channel_id(&self) -> Result<u32> {
        parse_number(&self.run_line(verbs::CHID, None).await?, "channel id")
    }

    /// `GETGUID`
    pub async fn get_guid(&self) -> Result<Guid> {
        guid(&self.run_line(verbs::GETGUID, None).await?)
    }

    /// `SETGUID <guid>`
    pub async fn set_guid(&self, guid: &Guid) -> Result<()> {
        self.run(verbs::SETGUID, Some(&guid.to_string())).await?;
        Ok(())
    }

    /// `WCYD`: capability bitmap, most significant byte first.
    pub async fn what_can_you_do(&self) -> Result<Vec<u8>> {
        parse_capabilities(&self.run_line(verbs::WCYD, None).await?)
    }

    /// `SETFILTER priority,class,type,guid`
    pub async fn set_filter(&self, filter: &Filter) -> Result<()> {
        self.run(verbs::SETFILTER, Some(&filter.to_argument())).await?;
        Ok(())
    }

    /// `SETMASK priority,class,type,guid`
    pub async fn set_mask(&self, mask: &Filter) -> Result<()> {
        self.run(verbs::SETMASK, Some(&mask.to_argument())).await?;
        Ok(())
    }

    /// `VAR LIST [regex]`
    pub async fn list_var(&self, filter: Option<&str>) -> Result<Vec<VariableEntry>> {
        let filter = filter.map(str::trim).filter(|f| !f.is_empty());
        self.run(verbs::VAR_LIST, filter)
            .await?
            .iter()
            .filter(|line| !line.trim().is_empty())
            .map(|line| line.parse::<VariableEntry>())
            .collect()
    }

    /// `VAR READ <name>`
    pub async fn read_var(&self, name: &str) -> Result<Variable> {
        check_variable_name(name)?;
        self.run_line(verbs::VAR_READ, Some(name)).await?.parse()
    }

    /// `VAR WRITE name;type;persistent;owner;rights;value;note`
    pub async fn write_var(&self, variable: &VariableWrite) -> Result<()> {
        let argument = variable.to_argument()?;
        self.run(verbs::VAR_WRITE, Some(&argument)).await?;
        Ok(())
    }

    /// `VAR REMOVE <name>`
    pub async fn remove_var(&self, name: &str) -> Result<()> {
        check_variable_name(name)?;
        self.run(verbs::VAR_REMOVE, Some(name)).await?;
        Ok(())
    }

    /// `VAR LENGTH <name>`: length of the value.
    pub async fn length_var(&self, name: &str) -> Result<u32> {
        check_variable_name(name)?;
        parse_number(&self.run_line(verbs::VAR_LENGTH, Some(name)).await?, "variable length")
    }

    /// `VAR LASTCHANGE <name>`
    pub async fn last_change_var(&self, name: &str) -> Result<String> {
        check_variable_name(name)?;
        Ok(self
            .run_line(verbs::VAR_LASTCHANGE, Some(name))
            .await?
            .trim()
            .to_string())
    }

    /// `VAR RESET <name>`
    pub async fn reset_var(&self, name: &str) -> Result<()> {
        check_variable_name(name)?;
        self.run(verbs::VAR_RESET, Some(name)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ConnectionState;
    use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

    /// Connected client plus the server side split into a line reader and
    /// a writer.
    async fn connected() -> (
        Client,
        tokio::io::Lines<BufReader<tokio::io::ReadHalf<DuplexStream>>>,
        tokio::io::WriteHalf<DuplexStream>,
    ) {
        let client = Client::builder().build();
        let (local, remote) = duplex(4096);
        let (read, mut write) = tokio::io::split(remote);
        write.write_all(b"Welcome\r\n+OK\r\n").await.unwrap();
        client.connect_stream(local).await.unwrap();
        (client, BufReader::new(read).lines(), write)
    }

    #[tokio::test]
    async fn test_noop_while_disconnected() {
        let client = Client::builder().build();
        assert!(matches!(client.noop().await, Err(VscpError::NotConnected)));
    }

    #[tokio::test]
    async fn test_version() {
        let (client, mut requests, mut server) = connected().await;

        let call = tokio::spawn({
            let client = client.clone();
            async move { client.get_remote_version().await }
        });

        assert_eq!(requests.next_line().await.unwrap().unwrap(), "VERSION");
        server.write_all(b"1,2,3,4\r\n+OK\r\n").await.unwrap();

        let version = call.await.unwrap().unwrap();
        assert_eq!((version.major, version.minor, version.release, version.build), (1, 2, 3, 4));
    }

    #[tokio::test]
    async fn test_validation_happens_before_io() {
        let (client, _requests, _server) = connected().await;

        assert!(matches!(client.user("").await, Err(VscpError::InvalidArgument(_))));
        assert!(matches!(
            client.retrieve_events(0).await,
            Err(VscpError::InvalidArgument(_))
        ));
        assert!(matches!(
            client.read_var("two words").await,
            Err(VscpError::InvalidArgument(_))
        ));
        assert_eq!(client.pending_commands(), 0);
    }

    #[tokio::test]
    async fn test_authenticate_sends_digest() {
        let (client, mut requests, mut server) = connected().await;

        let call = tokio::spawn({
            let client = client.clone();
            async move { client.authenticate("admin", "secret").await }
        });

        assert_eq!(requests.next_line().await.unwrap().unwrap(), "CHALLENGE");
        server.write_all(b"abc\r\n+OK\r\n").await.unwrap();
        assert_eq!(
            requests.next_line().await.unwrap().unwrap(),
            format!("AUTH admin;{}", auth_digest("secret", "abc"))
        );
        server.write_all(b"+OK - Success.\r\n").await.unwrap();

        call.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_login_failure_settles_both() {
        let (client, mut requests, mut server) = connected().await;

        let call = tokio::spawn({
            let client = client.clone();
            async move { client.login("admin", "wrong").await }
        });

        assert_eq!(requests.next_line().await.unwrap().unwrap(), "USER admin");
        assert_eq!(requests.next_line().await.unwrap().unwrap(), "PASS wrong");
        server
            .write_all(b"+OK\r\n1,Invalid password\r\n-OK - Error.\r\n")
            .await
            .unwrap();

        let err = call.await.unwrap().unwrap_err();
        let server_error = err.server_error().unwrap();
        assert_eq!(server_error.code, Some(1));
        assert_eq!(server_error.description, "Invalid password");
        assert_eq!(client.pending_commands(), 0);
    }

    #[tokio::test]
    async fn test_rcv_loop_round_trip() {
        let (client, mut requests, mut server) = connected().await;

        let start = tokio::spawn({
            let client = client.clone();
            async move { client.start_rcv_loop().await }
        });
        assert_eq!(requests.next_line().await.unwrap().unwrap(), "RCVLOOP");
        server.write_all(b"+OK\r\n").await.unwrap();
        start.await.unwrap().unwrap();
        assert_eq!(client.state(), ConnectionState::RcvLoop);

        assert!(matches!(client.noop().await, Err(VscpError::InvalidState(_))));

        let stop = tokio::spawn({
            let client = client.clone();
            async move { client.stop_rcv_loop().await }
        });
        assert_eq!(requests.next_line().await.unwrap().unwrap(), "QUITLOOP");
        server.write_all(b"+OK - Quit receive loop.\r\n").await.unwrap();
        stop.await.unwrap().unwrap();
        assert_eq!(client.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_read_var() {
        let (client, mut requests, mut server) = connected().await;

        let call = tokio::spawn({
            let client = client.clone();
            async move { client.read_var("greeting").await }
        });
        assert_eq!(requests.next_line().await.unwrap().unwrap(), "VAR READ greeting");
        server
            .write_all(b"greeting;1;true;0;484;2024-01-01T00:00:00;SGVsbG8=;\r\n+OK\r\n")
            .await
            .unwrap();

        let var = call.await.unwrap().unwrap();
        assert_eq!(var.value, "Hello");
        assert!(var.persistent);
    }

    #[tokio::test]
    async fn test_retrieve_events() {
        let (client, mut requests, mut server) = connected().await;

        let call = tokio::spawn({
            let client = client.clone();
            async move { client.retrieve_events(2).await }
        });
        assert_eq!(requests.next_line().await.unwrap().unwrap(), "RETR 2");
        server
            .write_all(b"0,10,6,0,,0,-,1\r\n0,20,3,0,,0,-,2,3\r\n+OK - 2 event(s).\r\n")
            .await
            .unwrap();

        let events = call.await.unwrap().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].vscp_class, 20);
        assert_eq!(events[1].data, vec![2, 3]);
    }
}
